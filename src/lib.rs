#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod survey;
