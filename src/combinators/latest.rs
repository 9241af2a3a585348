use super::{Derived, Replay, Wiring};
use crate::signal::Signal;

/// Fire with `(a, b)` once both sources have fired, then on every fire of
/// either source with the latest pair.
///
/// Both sources must retain their last data; they are replayed on
/// creation.
pub fn combine_latest<A, B>(one: &Signal<A>, two: &Signal<B>) -> Derived<(A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    Wiring::new((None, None))
        .feed(one, Replay::Required, |l, a| l.0 = Some(a), pair)
        .feed(two, Replay::Required, |l, b| l.1 = Some(b), pair)
        .finish()
}

/// Three-source [`combine_latest`].
pub fn combine_latest3<A, B, C>(
    one: &Signal<A>,
    two: &Signal<B>,
    three: &Signal<C>,
) -> Derived<(A, B, C)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    Wiring::new((None, None, None))
        .feed(one, Replay::Required, |l, a| l.0 = Some(a), triple)
        .feed(two, Replay::Required, |l, b| l.1 = Some(b), triple)
        .feed(three, Replay::Required, |l, c| l.2 = Some(c), triple)
        .finish()
}

fn pair<A: Clone, B: Clone>(latest: &(Option<A>, Option<B>)) -> Option<(A, B)> {
    Some((latest.0.clone()?, latest.1.clone()?))
}

fn triple<A: Clone, B: Clone, C: Clone>(
    latest: &(Option<A>, Option<B>, Option<C>),
) -> Option<(A, B, C)> {
    Some((latest.0.clone()?, latest.1.clone()?, latest.2.clone()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_needs_both_sides() {
        assert_eq!(pair::<i32, i32>(&(Some(1), None)), None);
        assert_eq!(pair(&(Some(1), Some("b"))), Some((1, "b")));
    }

    #[test]
    fn test_combine_latest_replays_existing_values() {
        let one = Signal::<i32>::retaining();
        let two = Signal::<i32>::retaining();
        one.fire(1);
        two.fire(2);

        let combined = combine_latest(&one, &two);
        assert_eq!(combined.last_data(), Some((1, 2)));
    }

    #[test]
    fn test_combine_latest3_waits_for_all() {
        let a = Signal::<i32>::retaining();
        let b = Signal::<i32>::retaining();
        let c = Signal::<i32>::retaining();
        let combined = combine_latest3(&a, &b, &c);

        a.fire(1);
        b.fire(2);
        assert_eq!(combined.fire_count(), 0);

        c.fire(3);
        assert_eq!(combined.last_data(), Some((1, 2, 3)));
        b.fire(20);
        assert_eq!(combined.last_data(), Some((1, 20, 3)));
        assert_eq!(combined.fire_count(), 2);
    }
}
