//! New Steps acceptance harness core
//!
//! Drives a deployed New Steps instance through four probe layers and a
//! multi-actor scenario, and assembles the results into one `Report`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Orchestrator                              │
//! │    L1 build ─► L2 integration ─► L3 workflows ─► L4 health  │
//! │                                   └─► multi-actor scenario   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  layers      HttpProbe (reqwest) against pages and APIs      │
//! │  workflows   Workflow<WorkflowContext> step sequences        │
//! │    ├── SelectorResolver  semantic name → DOM action          │
//! │    ├── DynamicWaitPolicy network idle + loading indicators   │
//! │    └── SessionManager    user / admin sessions               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  browser     Page / BrowserFactory (chromiumoxide)           │
//! │  registry    every New Steps selector, path, and token       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod error;
pub mod layers;
pub mod orchestrator;
pub mod payloads;
pub mod probe;
pub mod registry;
pub mod selectors;
pub mod session;
pub mod wait;
pub mod workflow;
pub mod workflows;

pub use browser::{BrowserFactory, ChromiumFactory, Locator, Page};
pub use error::{HarnessError, HarnessResult};
pub use orchestrator::{Orchestrator, Suite};
pub use probe::{Expect, HttpProbe, ProbeRecord};
pub use registry::{registry, Registry};
pub use workflow::{StepOutcome, Workflow};
