//! Pure state-machine loop combinator.

use crate::error::Result;

/// Run `body` while `cond` holds, threading the state by value.
///
/// Both closures are `Fn`: the loop carries no hidden mutable state, so the
/// final state is a pure function of `init` whenever `cond` and `body` are.
/// The first error from either closure ends the loop.
pub fn while_loop<S, C, B>(cond: C, body: B, init: S) -> Result<S>
where
    C: Fn(&S) -> Result<bool>,
    B: Fn(S) -> Result<S>,
{
    let mut state = init;
    while cond(&state)? {
        state = body(state)?;
    }
    Ok(state)
}
