//! Contains all of the types needed to specify options for client
//! construction and operation execution.

/// Updates the fields of an options struct that are `None` with the
/// corresponding values from the given object, if they are `Some`.
macro_rules! resolve_options {
    ($obj:expr, $opts:expr, [$( $field:ident ),+] ) => {
        $(
            if let Some(option) = $obj.$field() {
                if !$opts
                    .as_ref()
                    .map(|opts| opts.$field.is_some())
                    .unwrap_or(false)
                {
                    $opts.get_or_insert_with(Default::default).$field = Some(option.clone());
                }
            }
        )+
    };
}

pub use crate::{
    client::{options::*, session::SessionOptions},
    concern::*,
    operation::{CommandShape, ConcernFlags, ExecuteOptions},
    selection_criteria::*,
};
