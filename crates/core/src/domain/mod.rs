pub mod context;
pub mod credential;
pub mod session;
pub mod turn;
