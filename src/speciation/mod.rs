//! Chemical speciation: expanding lumped VOC/NOx/PM2.5 emissions into
//! individual compounds or chemical-mechanism groups.
pub mod db;
pub mod mechanism;
pub mod reference;
pub mod speciator;
