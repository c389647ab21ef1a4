// SQL Server driver adapter over tiberius.
//
// - batch: T-SQL composition for bound requests
// - client: connection settings and dedicated client creation
// - driver: the `Driver` implementation (pooled or direct connections)
// - params: value binding and type inference for untyped inputs
// - pool: deadpool manager
// - query: result stream assembly and cell conversion

pub mod batch;
pub mod client;
pub mod driver;
pub mod params;
pub mod pool;
pub mod query;

pub use client::{MssqlClient, build_tiberius_config, create_mssql_client};
pub use driver::{MssqlConnection, MssqlDriver};
pub use pool::MssqlManager;
