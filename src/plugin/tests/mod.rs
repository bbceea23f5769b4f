//! Plugin System Tests
//! 
//! Pipeline tests driven through in-process units and generated packages.

pub mod support;



#[cfg(test)]
pub mod registry_tests;
