pub mod ai;
pub mod market;
pub mod news;
pub mod record;
pub mod section;
pub mod settings;
