pub mod category;
pub mod company;
pub mod job;
pub mod skill;
