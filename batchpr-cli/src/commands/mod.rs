pub mod errors;
pub mod run;
pub mod status;
