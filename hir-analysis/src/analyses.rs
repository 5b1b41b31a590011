mod dominators;
mod expressions;
mod faint;
mod lcm;

pub use self::{
    dominators::Dominators,
    expressions::{Expression, ExpressionDomain},
    faint::{FaintValues, is_live_regardless},
    lcm::LazyCodeMotionAnalysis,
};
