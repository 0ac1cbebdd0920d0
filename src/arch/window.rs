/// Gives a layer access to the layers of the neighboring time steps.
///
/// Windows are resolved by the caller on every forward and backward call, layers never keep
/// references to their neighbors.
pub trait TemporalWindow<L> {
    /// The layer of the previous time step, if any.
    fn previous(&self) -> Option<&L>;

    /// The layer of the next time step, if any.
    fn next(&self) -> Option<&L>;
}

/// A window without neighbors, for layers outside of a sequence.
#[derive(Clone, Copy, Debug, Default)]
pub struct Detached;

impl<L> TemporalWindow<L> for Detached {
    fn previous(&self) -> Option<&L> {
        None
    }

    fn next(&self) -> Option<&L> {
        None
    }
}

/// A window borrowing the neighbors of one step of a sequence.
#[derive(Debug)]
pub struct Neighbors<'a, L> {
    previous: Option<&'a L>,
    next: Option<&'a L>,
}

impl<'a, L> Neighbors<'a, L> {
    pub fn new(previous: Option<&'a L>, next: Option<&'a L>) -> Self {
        Self { previous, next }
    }
}

impl<L> TemporalWindow<L> for Neighbors<'_, L> {
    fn previous(&self) -> Option<&L> {
        self.previous
    }

    fn next(&self) -> Option<&L> {
        self.next
    }
}

/// Splits a sequence of per-step layers into the layer at step `t` and a window over its
/// neighbors.
///
/// # Arguments
/// * `steps` - The layers of the sequence in chronological order.
/// * `t` - The step to borrow mutably.
///
/// # Returns
/// `None` if `t` is out of bounds.
pub fn split_at_step<L>(steps: &mut [L], t: usize) -> Option<(&mut L, Neighbors<'_, L>)> {
    if t >= steps.len() {
        return None;
    }

    let (before, rest) = steps.split_at_mut(t);
    let (current, after) = rest.split_first_mut()?;
    let (before, after): (&[L], &[L]) = (before, after);

    Some((current, Neighbors::new(before.last(), after.first())))
}
