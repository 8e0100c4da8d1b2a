//! Pipeline stages for bill scanning.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. point at a different parsing service) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ normalize ──▶ extract ──▶ interpret ──▶ parse
//! (bytes)   (single PDF)  (text)      (model reply)  (BillFields)
//! ```
//!
//! 1. [`normalize`]  accepts PDF/JPEG/PNG and produces one canonical temp
//!    PDF plus a permanent archive copy; images are re-wrapped losslessly
//! 2. [`extract`]    sends the canonical PDF to the parsing service and
//!    collects text segments; the first stage with network I/O
//! 3. [`interpret`]  asks the model to pull the four bill fields out of the
//!    extracted text
//! 4. [`parse`]      recovers the fenced JSON object from the reply and
//!    validates field completeness
//!
//! Persistence lives outside the pipeline in [`crate::store`]; sequencing,
//! validation, and cleanup guarantees live in [`crate::scan`].

pub mod extract;
pub mod interpret;
pub mod normalize;
pub mod parse;
