/*!
Projection pipeline

Orchestrates one projection run end to end: plan the fit, produce the
points through the engine, persist reducer and points through the stores.
Split into:

- [`strategy`]: pure decision functions (fit mode, shuffle, sample split)
- `locks`: per-collection run serialization (crate-internal)
- the runner: [`ProjectionPipeline`], its builder, and [`ProjectionRequest`]
*/

mod locks;
mod runner;
pub mod strategy;

pub use runner::{ProjectionPipeline, ProjectionPipelineBuilder, ProjectionRequest};
