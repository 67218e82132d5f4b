//! # Events Module
//!
//! Progress events emitted by the probe pipeline.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         if let Event::Fingerprint(FingerprintEvent::Progress(p)) = event {
//!             println!("{}/{} {}", p.completed, p.total, p.current_id);
//!         }
//!     }
//! });
//!
//! pipeline.run_with_events(&items, &sender)?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
