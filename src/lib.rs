//! # tabsync - Table-Based File Synchronizer
//!
//! tabsync keeps copies of large, rarely changing files in step across
//! local directories, SSH hosts and XRootD servers. Each location keeps a
//! small manifest (a "table") recording, per file name, where the file
//! lives plus the content hash and modification time of the version there.
//! Reconciling the tables propagates the most recent version of every
//! file to every location.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabsync::{Manager, ProcessRunner, ProtocolRegistry, Transport, UpdateOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ProtocolRegistry::new();
//!     let mut manager = Manager::new();
//!     manager.add_table(registry.make("/data/table.json", None)?);
//!     manager.add_table(registry.make("user@host:/data/table.json", None)?);
//!
//!     let report = manager
//!         .update(&registry, &Transport::new(ProcessRunner), &UpdateOptions::default())
//!         .await?;
//!     println!("Copied {} files", report.files_copied);
//!     Ok(())
//! }
//! ```
//!
//! ## Registering files
//!
//! ```rust,ignore
//! use tabsync::{Backup, FileInfo, Modifiers, ProtocolPath, Table};
//!
//! let mut table = Table::new("reference data");
//! let info = FileInfo::from_name_and_local_file("calib", ProtocolPath::local("/data/calib.root"), &Modifiers::new()).await?;
//! table.insert(info);
//! table.write("/data/table.json".as_ref(), Backup::Beside).await?;
//! ```

pub mod config;
pub mod error;
pub mod fields;
pub mod files;
pub mod logging;
pub mod manager;
pub mod parallel;
pub mod protocol;
pub mod table;

// Re-export commonly used types and functions
pub use config::{Config, Modifiers};
pub use error::{PathError, RegistrationError, SyncError, TableError, TransferError};
pub use files::{FileInfo, FileMarks};
pub use manager::{Manager, UpdateOptions, UpdateReport};
pub use protocol::{protocol_path, ProcessRunner, ProtocolPath, ProtocolRegistry, Transport};
pub use table::{Backup, Collisions, Table};

// vim: ts=4
