//! Refinements narrow what an unknown value could eventually become.
//!
//! They are advisory: dropping a refinement never changes correctness, only
//! how much a consumer can conclude before the value is known.
use crate::types::Type;
use crate::value::Number;

/// Prefixes longer than this are cut back to the nearest char boundary.
pub const MAX_STRING_PREFIX: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumberBound {
    pub value: Number,
    pub inclusive: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Refinement {
    not_null: bool,
    string_prefix: Option<String>,
    number_lower: Option<NumberBound>,
    number_upper: Option<NumberBound>,
    length_lower: Option<u64>,
    length_upper: Option<u64>,
}

// ------------------------------- Builder ---------------------------------- //

impl Refinement {
    pub fn new() -> Self {
        Self::default()
    }

    /// The eventual value is definitely not null.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn string_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if prefix.len() > MAX_STRING_PREFIX {
            let mut cut = MAX_STRING_PREFIX;
            while !prefix.is_char_boundary(cut) {
                cut -= 1;
            }
            prefix.truncate(cut);
        }
        self.string_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    pub fn number_lower_bound(mut self, value: Number, inclusive: bool) -> Self {
        self.number_lower = Some(NumberBound { value, inclusive });
        self
    }

    pub fn number_upper_bound(mut self, value: Number, inclusive: bool) -> Self {
        self.number_upper = Some(NumberBound { value, inclusive });
        self
    }

    pub fn length_lower_bound(mut self, len: u64) -> Self {
        self.length_lower = Some(len);
        self
    }

    pub fn length_upper_bound(mut self, len: u64) -> Self {
        self.length_upper = Some(len);
        self
    }

    pub fn exact_length(self, len: u64) -> Self {
        self.length_lower_bound(len).length_upper_bound(len)
    }
}

// ------------------------------- Access ----------------------------------- //

impl Refinement {
    pub fn is_not_null(&self) -> bool { self.not_null }
    pub fn prefix(&self) -> Option<&str> { self.string_prefix.as_deref() }
    pub fn lower_bound(&self) -> Option<&NumberBound> { self.number_lower.as_ref() }
    pub fn upper_bound(&self) -> Option<&NumberBound> { self.number_upper.as_ref() }
    pub fn length_lower(&self) -> Option<u64> { self.length_lower }
    pub fn length_upper(&self) -> Option<u64> { self.length_upper }

    /// Lower the minimum length to at most `cap`.
    pub(crate) fn cap_length_lower(mut self, cap: u64) -> Self {
        self.length_lower = self.length_lower.map(|n| n.min(cap));
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Refinement::default()
    }

    /// Keep only what is meaningful for `ty`: prefixes for strings, numeric
    /// bounds for numbers, length bounds for collections. Nullness applies to
    /// every type.
    pub fn retain_for(&self, ty: &Type) -> Refinement {
        let mut out = Refinement { not_null: self.not_null, ..Refinement::default() };
        match ty {
            Type::String => out.string_prefix = self.string_prefix.clone(),
            Type::Number => {
                out.number_lower = self.number_lower.clone();
                out.number_upper = self.number_upper.clone();
            }
            Type::List(_) | Type::Set(_) | Type::Map(_) => {
                out.length_lower = self.length_lower;
                out.length_upper = self.length_upper;
            }
            _ => {}
        }
        out
    }
}
