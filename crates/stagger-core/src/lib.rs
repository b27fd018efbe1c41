//! Core types and traits for the Stagger simulation framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers shared by every other crate (cells, fields), the
//! error taxonomy of the solve/transfer subsystems, and the
//! [`Communicator`] trait through which all cross-rank agreement flows.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod comm;
pub mod error;
pub mod id;

pub use comm::{Communicator, SerialComm};
pub use error::{SolveError, TransferError};
pub use id::{CellId, FieldKind, Gradient};
