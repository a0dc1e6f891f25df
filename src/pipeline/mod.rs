//! Pipeline stages for annual-report analysis.
//!
//! Each submodule implements one step so it can be tested on its own and
//! swapped (e.g. a different extractor) without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ tables ──▶ ratios ─────────────┐
//! (path/URL) (pdfium)   (layout)  (crate::ratios)      ├──▶ report / chart
//!                 └──▶ llm ──▶ postprocess ────────────┘
//!                     (insights ∥ analytics)
//! ```
//!
//! 1. [`input`]   — read a local file or download a URL into memory, enforce
//!    the size limit, check the `%PDF` magic bytes
//! 2. [`extract`] — page text + metadata via pdfium, in `spawn_blocking`
//! 3. [`tables`]  — recover rectangular tables from the page text layout
//! 4. [`llm`]     — model calls with timeout and bounded retry; the only
//!    stage with network I/O besides URL download
//! 5. [`postprocess`] — clean model text and split it into bullets
//! 6. [`chart`]   — ratio bar chart as PNG
//! 7. [`report`]  — lay out and write the PDF summary

pub mod chart;
pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod report;
pub mod tables;
