//! Test suite for ClubSync
//!
//! This module organizes all tests
