//! Variable expansion and printf-style formatting of property values.

mod format;
mod substitutor;

pub use format::FormatArg;
pub use substitutor::{EnvLookup, Substitutor, VariableLookup, has_variables};

pub(crate) use format::format_args_printf;
