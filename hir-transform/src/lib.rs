#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod dce;
mod landing_pad;
mod lcm;
mod licm;

pub use self::{
    dce::DeadCodeElimination,
    landing_pad::LandingPadTransform,
    lcm::LazyCodeMotion,
    licm::LoopInvariantCodeMotion,
};
