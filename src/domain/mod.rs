// Domain layer: data model and the ports the acquisition controller is wired through.

pub mod model;
pub mod ports;
