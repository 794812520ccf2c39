//! Adapters: concrete implementations of the domain's ports (§4.4, §9).

pub mod providers;
