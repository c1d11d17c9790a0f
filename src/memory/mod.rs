mod exp;
mod replay;

pub use exp::*;
pub use replay::ReplayMemory;
