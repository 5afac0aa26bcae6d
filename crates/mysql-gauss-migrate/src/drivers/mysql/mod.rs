//! MySQL source driver.
//!
//! - [`MysqlReader`]: metadata and row streaming over SQLx
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+ (check constraints need 10.2.1+)

mod reader;

pub use reader::MysqlReader;
