pub mod advance;
pub mod advance_skip;
pub mod attendance;
pub mod audit;
pub mod employee;
pub mod roster;
pub mod society;
pub mod system;
