// Core workflow modules for the FC passthrough tool

pub mod command;
pub mod passthrough;
pub mod selection;
