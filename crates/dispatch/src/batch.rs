/// The contexts one handler invocation works on.
///
/// The immediate lane hands over a single context; a closing debounce window
/// hands over everything it collected, in arrival order. Never empty.
#[derive(Debug)]
pub struct Batch<C> {
    first: C,
    rest: Vec<C>,
    batched: bool,
}

impl<C> Batch<C> {
    pub fn single(context: C) -> Self {
        Self {
            first: context,
            rest: Vec::new(),
            batched: false,
        }
    }

    /// `None` when `contexts` is empty.
    pub fn batched(contexts: Vec<C>) -> Option<Self> {
        let mut iter = contexts.into_iter();
        let first = iter.next()?;
        Some(Self {
            first,
            rest: iter.collect(),
            batched: true,
        })
    }

    /// Whether this came from a debounce window.
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn first(&self) -> &C {
        &self.first
    }

    pub fn first_mut(&mut self) -> &mut C {
        &mut self.first
    }

    pub fn last(&self) -> &C {
        self.rest.last().unwrap_or(&self.first)
    }

    pub fn last_mut(&mut self) -> &mut C {
        match self.rest.last_mut() {
            Some(last) => last,
            None => &mut self.first,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &C> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut C> {
        std::iter::once(&mut self.first).chain(self.rest.iter_mut())
    }

    pub fn into_first(self) -> C {
        self.first
    }

    pub fn into_vec(self) -> Vec<C> {
        let mut all = Vec::with_capacity(1 + self.rest.len());
        all.push(self.first);
        all.extend(self.rest);
        all
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn single_batch() {
        let mut batch = Batch::single(1);
        assert!(!batch.is_batched());
        assert_eq!(batch.len(), 1);
        *batch.last_mut() += 1;
        assert_eq!(*batch.first(), 2);
    }

    #[test]
    fn batched_keeps_order() {
        assert!(Batch::<u8>::batched(vec![]).is_none());

        let mut batch = Batch::batched(vec![1, 2, 3]).unwrap();
        assert!(batch.is_batched());
        assert_eq!((*batch.first(), *batch.last()), (1, 3));
        for n in batch.iter_mut() {
            *n *= 10;
        }
        assert_eq!(batch.into_vec(), vec![10, 20, 30]);
    }
}
