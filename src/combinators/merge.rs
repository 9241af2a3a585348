use super::{Derived, Replay, Wiring};
use crate::signal::Signal;

/// Fire on every fire of either source with the latest value of both.
///
/// Sources that retain data are replayed on creation.
pub fn merge<A, B>(one: &Signal<A>, two: &Signal<B>) -> Derived<(Option<A>, Option<B>)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    Wiring::new((None, None))
        .feed(one, Replay::IfRetained, |l, a| l.0 = Some(a), |l| Some(l.clone()))
        .feed(two, Replay::IfRetained, |l, b| l.1 = Some(b), |l| Some(l.clone()))
        .finish()
}

/// Three-source [`merge`].
#[allow(clippy::type_complexity)]
pub fn merge3<A, B, C>(
    one: &Signal<A>,
    two: &Signal<B>,
    three: &Signal<C>,
) -> Derived<(Option<A>, Option<B>, Option<C>)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
    C: Clone + Send + 'static,
{
    Wiring::new((None, None, None))
        .feed(one, Replay::IfRetained, |l, a| l.0 = Some(a), |l| Some(l.clone()))
        .feed(two, Replay::IfRetained, |l, b| l.1 = Some(b), |l| Some(l.clone()))
        .feed(three, Replay::IfRetained, |l, c| l.2 = Some(c), |l| Some(l.clone()))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observer;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_merge_replays_retained_sources() {
        let one = Signal::<i32>::retaining();
        let two = Signal::<&'static str>::new();
        one.fire(5);

        let merged = merge(&one, &two);
        assert_eq!(merged.last_data(), Some((Some(5), None)));

        two.fire("x");
        assert_eq!(merged.last_data(), Some((Some(5), Some("x"))));
    }

    #[test]
    fn test_merge3_tracks_each_slot() {
        let a = Signal::<i32>::retaining();
        let b = Signal::<i32>::retaining();
        let c = Signal::<i32>::retaining();
        let merged = merge3(&a, &b, &c);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = Observer::new();
        merged.subscribe(&observer, move |v| sink.lock().push(v));

        c.fire(3);
        a.fire(1);
        assert_eq!(
            *seen.lock(),
            vec![(None, None, Some(3)), (Some(1), None, Some(3))]
        );
    }
}
