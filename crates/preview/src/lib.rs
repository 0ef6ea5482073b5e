//! # preview - static preview of workspace templates
//!
//! Finds out which parameters a Terraform workspace template asks for, and which tags it
//! produces, without running Terraform.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `preview` works internally.
//!
//! ### Terms
//!
//! - a template is a directory of `.tf` files (the root module), optional `.tfvars` files and
//!   optional local modules in subdirectories
//! - a parameter is declared with a `data "coder_parameter" "<label>" {}` block
//! - tags are declared with `data "coder_workspace_tags" "<label>" { tags = { ... } }`
//!
//! ```hcl
//! data "coder_parameter" "region" {
//!   name    = "region"
//!   default = "us"
//!
//!   option {
//!     name  = "US"
//!     value = "us"
//!   }
//!   option {
//!     name  = "EU"
//!     value = "eu"
//!   }
//! }
//!
//! data "coder_workspace_tags" "tags" {
//!   tags = {
//!     "region" = data.coder_parameter.region.value
//!   }
//! }
//! ```
//!
//! ### Loading files
//!
//! [source_tree::SourceTree] holds the contents of all files by their path relative to the
//! template root. [document::parse] turns one file into declarations that keep their source
//! ranges so diagnostics can point at the offending text.
//!
//! ### Values
//!
//! Terraform values may not be known before apply, so [value::Value] has an `Unknown` variant
//! next to the usual null, scalars and collections. Values are immutable; [merge] combines them
//! when the instances of a repeated block (`count`/`for_each`) are written one by one.
//!
//! ### Evaluation
//!
//! [evaluator::Evaluator] walks the blocks of the root module and the local modules it calls and
//! evaluates their attributes with [hcl::eval] against a [context::ContextTree]. A reference that
//! cannot be resolved yet is not an error: the attribute becomes unknown and is retried on the
//! next pass.
//!
//! After every pass the [hooks] write the values Terraform would have provided:
//!
//! - [hooks::PlanHook]: resource values captured in a plan
//! - [hooks::OwnerHook]: the workspace owner
//! - [hooks::ParameterHook]: parameter values, given by the caller or from the `default`
//!
//! Passes repeat until no module context changes, so a parameter default referencing another
//! parameter resolves once that parameter has a value.
//!
//! ### Extraction
//!
//! [extract] turns the evaluated blocks into [parameter::Parameter]s and [tags::TagBlocks]. Every
//! problem found along the way is a [diagnostics::Diagnostic]; only problems that leave nothing to
//! show (unparsable files, an unreadable plan) stop the preview.
//!
//! ### Output
//!
//! [preview::preview] runs all of the above and returns a [preview::Output], which serializes via
//! [serde].
pub mod context;
pub mod diagnostics;
pub mod document;
pub mod evaluator;
pub mod extract;
mod functions;
pub mod hooks;
pub mod merge;
pub mod owner;
pub mod parameter;
pub mod plan;
pub mod preview;
pub mod source_tree;
pub mod tags;
mod util;
pub mod value;
pub mod valued;
mod visit;
pub mod warnings;

pub use preview::{preview, preview_dir, Input, Output};
