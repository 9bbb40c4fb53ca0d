//! Upstream source tables: surveillance exports, trend exports, and their join.

pub mod combine;
pub mod epiweek;
pub mod fluview;
pub mod regions;
pub mod trends;
