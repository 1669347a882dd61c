//! Orchestrator phases: the provisioning pipeline stages.
//!
//! - **Download** (`fetch`) - concurrent, atomic artifact downloads
//! - **Prerequisites** (`gate`) - blocking checks for operator-installed tools
//! - **Checkout** (`checkout`) - idempotent source clone
//! - **Build** (`build`) - sequential per-architecture builds and packaging
//!
//! Each phase is independently testable; the orchestrator sequences them.

pub mod build;
pub mod checkout;
pub mod fetch;
pub mod gate;

pub use build::ArchBuilder;
pub use checkout::SourceCheckout;
pub use fetch::ArtifactFetcher;
pub use gate::PrerequisiteGate;
