pub mod atom;
pub mod system;
pub mod topology;
