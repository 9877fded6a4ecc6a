pub mod doctor;
pub mod reconcile;
pub mod run;
pub mod sync;
