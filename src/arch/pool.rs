use std::rc::Rc;

use log::debug;

use super::{Layer, SharedParams};
use crate::error::Result;

/// Reuses layer instances by id, all of them tied to the same parameters.
///
/// The same id always maps to the same instance during the pool's lifetime. Acquiring id `0`
/// starts a new sequence, from then on only the acquired instances are considered in use.
pub struct LayerPool<L: Layer, F> {
    params: SharedParams<L::Params>,
    factory: F,
    items: Vec<L>,
    in_use: usize,
}

impl<L, F> LayerPool<L, F>
where
    L: Layer,
    F: FnMut(SharedParams<L::Params>) -> Result<L>,
{
    /// Creates a new empty `LayerPool`.
    ///
    /// # Arguments
    /// * `params` - The parameters every instance of the pool is tied to.
    /// * `factory` - Builds a new instance given the shared parameters.
    pub fn new(params: SharedParams<L::Params>, factory: F) -> Self {
        Self {
            params,
            factory,
            items: Vec::new(),
            in_use: 0,
        }
    }

    pub fn params(&self) -> &SharedParams<L::Params> {
        &self.params
    }

    /// Gets the instance with the given id, building it and any missing ones before it.
    ///
    /// # Returns
    /// The instance or the error of the factory.
    pub fn acquire(&mut self, id: usize) -> Result<&mut L> {
        if id == 0 {
            self.in_use = 0;
        }

        while self.items.len() <= id {
            let mut layer = (self.factory)(Rc::clone(&self.params))?;
            let new_id = self.items.len();
            layer.state_mut().set_id(new_id);

            debug!(layer = L::KIND, id = new_id; "Built a new pooled layer");
            self.items.push(layer);
        }

        self.in_use = self.in_use.max(id + 1);
        Ok(&mut self.items[id])
    }

    /// The instances acquired since id `0` was last requested, ordered by id.
    pub fn in_use(&self) -> &[L] {
        &self.items[..self.in_use]
    }

    pub fn in_use_mut(&mut self) -> &mut [L] {
        &mut self.items[..self.in_use]
    }

    /// The amount of instances built so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{
        LinearParams, share,
        layers::Feedforward,
    };

    fn pool() -> LayerPool<Feedforward, impl FnMut(SharedParams<LinearParams>) -> Result<Feedforward>>
    {
        let params = share(LinearParams::new(2, 3).unwrap());
        LayerPool::new(params, |params| Feedforward::new(params, None))
    }

    #[test]
    fn same_id_same_instance() {
        let mut pool = pool();

        let first: *const Feedforward = pool.acquire(2).unwrap();
        assert_eq!(pool.len(), 3);

        let again: *const Feedforward = pool.acquire(2).unwrap();
        assert_eq!(first, again);
        assert_eq!(pool.in_use()[2].id(), Some(2));
    }

    #[test]
    fn id_zero_starts_a_new_sequence() {
        let mut pool = pool();
        pool.acquire(0).unwrap();
        pool.acquire(1).unwrap();
        pool.acquire(2).unwrap();
        assert_eq!(pool.in_use().len(), 3);

        pool.acquire(0).unwrap();
        assert_eq!(pool.in_use().len(), 1);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn instances_share_the_parameters() {
        let mut pool = pool();
        pool.acquire(1).unwrap();

        let (a, b) = (&pool.in_use()[0], &pool.in_use()[1]);
        assert!(Rc::ptr_eq(a.state().shared_params(), b.state().shared_params()));
        assert!(Rc::ptr_eq(a.state().shared_params(), pool.params()));
    }
}
