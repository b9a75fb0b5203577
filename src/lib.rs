#[macro_use]
extern crate log;

pub mod errors;
pub mod geo_utils;
pub mod import_data;
pub mod logs;
pub mod polyline;
pub mod track_record;
