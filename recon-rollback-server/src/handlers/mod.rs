pub mod health;
pub mod rollbacks;
pub mod runs;
