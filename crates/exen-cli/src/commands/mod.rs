pub mod run;
pub mod schedules;
