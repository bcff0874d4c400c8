//! Tracing hooks for detector and matcher stages.
//!
//! Stages open one span named after the operation, tagged with the input
//! sizes, and report what they produced as `key = count` events. With the
//! `tracing` feature both forward to the info level; without it the field
//! values are evaluated and dropped.

#[cfg(feature = "tracing")]
macro_rules! trace_span {
    ($name:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info_span!($name $(, $key = $value)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_span {
    ($name:literal $(, $key:ident = $value:expr)* $(,)?) => {{
        let _ = ($($value,)*);
        $crate::trace::NoopSpan
    }};
}

/// Records what a stage produced, at least one `key = value` pair.
#[cfg(feature = "tracing")]
macro_rules! trace_event {
    ($name:literal, $($key:ident = $value:expr),+ $(,)?) => {
        tracing::info!(name: $name, $($key = $value),+)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_event {
    ($name:literal, $($key:ident = $value:expr),+ $(,)?) => {
        let _ = ($($value,)+);
    };
}

pub(crate) use trace_event;
pub(crate) use trace_span;

/// Guard returned by `trace_span!` when tracing is compiled out.
#[cfg(not(feature = "tracing"))]
pub struct NoopSpan;

#[cfg(not(feature = "tracing"))]
impl NoopSpan {
    #[inline]
    pub fn entered(self) -> Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{trace_event, trace_span};

    #[test]
    fn stage_macros_accept_counted_fields() {
        let shapes = [1u32, 2, 3];
        let _span = trace_span!("stage", width = 64usize, height = 48usize).entered();
        let _bare = trace_span!("bare_stage").entered();
        trace_event!("stage_shapes", count = shapes.len(), first = shapes[0]);
    }
}
