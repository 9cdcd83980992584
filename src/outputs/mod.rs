//! Output generation for calendar subscription files.
//!
//! # Output Structure
//!
//! ```text
//! subscribe_dir/
//! ├── Gateio_Listing.ics
//! └── Gateio_Delisting.ics
//! ```
//!
//! One ICS file per configured [`CalendarRequest`](crate::calendar::CalendarRequest);
//! every file is rebuilt from scratch on each run from the events that pass
//! the recency and criteria filters.

pub mod ics;
