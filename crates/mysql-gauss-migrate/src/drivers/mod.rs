//! Database driver implementations.
//!
//! - [`mysql`]: MySQL source
//! - [`postgres`]: GaussDB target (PostgreSQL protocol)
//! - [`common`]: TLS setup shared by target connections
//!
//! [`DriverConnector`] ties them to the [`Connector`] seam used by the
//! migration phases.

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::SslMode;
pub use mysql::MysqlReader;
pub use postgres::GaussWriter;

use async_trait::async_trait;

use crate::config::Config;
use crate::core::traits::{Connector, SourceConnection, TargetConnection};
use crate::error::Result;

/// Opens MySQL source and GaussDB target connections from configuration.
#[derive(Debug, Clone)]
pub struct DriverConnector {
    config: Config,
}

impl DriverConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for DriverConnector {
    async fn connect_source(&self) -> Result<Box<dyn SourceConnection>> {
        let reader = MysqlReader::connect(&self.config.source).await?;
        Ok(Box::new(reader))
    }

    async fn connect_target(&self) -> Result<Box<dyn TargetConnection>> {
        let writer = GaussWriter::connect(&self.config.target).await?;
        Ok(Box::new(writer))
    }
}
