//! This module contains all the components needed to read and write data from files (specifically CSV)
//!
//! The [`reader`] module contains a reader of transaction requests from CSV and the [`writer`] module contains a wallets report writer into CSV.
//! It would be possible to add new file formats by implementing the traits [`RequestsReader`] and [`WalletsReportWriter`] respectively.
//!
//! The [`request`] and [`report`] modules contain structs needed to serialize/deserialize data, with amounts in major units.
//! They are intentionally duplicated from the domain model to decouple the IO details from the domain logic and allow their evolution independently.
//!

mod reader;
mod report;
mod request;
mod writer;

pub use reader::{CsvRequestsReader, RequestsReader};
pub use writer::{CsvWalletsReportWriter, WalletsReportWriter};
