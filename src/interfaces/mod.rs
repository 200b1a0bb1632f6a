pub mod csv;
pub mod scenario;
