//! In-process event distribution.
//!
//! `publisher::EventPublisher` fans run progress events out to registered
//! subscribers. One publisher is constructed per engine and passed by
//! reference -- there is deliberately no global instance.

pub mod publisher;
