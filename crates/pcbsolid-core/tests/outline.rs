use pcbsolid_core::curve::Curve;
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::outline::{Attachment, Outline, OutlineState};

const MIN: f64 = 0.01;

fn seg(id: u64, a: Vec2, b: Vec2) -> Curve {
    Curve::line(id, a, b, MIN).unwrap()
}

fn polygon(points: &[Vec2]) -> Vec<Curve> {
    (0..points.len())
        .map(|i| seg(i as u64, points[i], points[(i + 1) % points.len()]))
        .collect()
}

/// Feed every curve until nothing more attaches, scanning in order like the
/// board assembler does.
fn assemble(mut pool: Vec<Curve>) -> (Outline, Vec<Curve>) {
    let mut outline = Outline::new(MIN);
    loop {
        if outline.is_closed() || pool.is_empty() {
            break;
        }
        let mut attached = false;
        for i in 0..pool.len() {
            if outline.match_candidate(&pool[i]).is_some() {
                let curve = pool.remove(i);
                assert!(outline.add_segment(curve).is_ok());
                attached = true;
                break;
            }
        }
        if !attached {
            break;
        }
    }
    (outline, pool)
}

/// Deterministic pseudo-random permutation (LCG), good enough for coverage.
fn shuffled(mut items: Vec<Curve>, seed: u64) -> Vec<Curve> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    for i in (1..items.len()).rev() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let j = (state >> 33) as usize % (i + 1);
        items.swap(i, j);
    }
    items
}

#[test]
fn polygon_closes_under_any_order_and_direction() {
    let hexagon = [
        Vec2::new(0.0, 0.0),
        Vec2::new(10.0, -2.0),
        Vec2::new(18.0, 4.0),
        Vec2::new(15.0, 12.0),
        Vec2::new(6.0, 14.0),
        Vec2::new(-3.0, 7.0),
    ];
    for seed in 0..64u64 {
        let mut curves = shuffled(polygon(&hexagon), seed);
        for (i, curve) in curves.iter_mut().enumerate() {
            if (seed >> (i % 6)) & 1 == 1 {
                curve.reverse();
            }
        }

        let (outline, left) = assemble(curves);
        assert_eq!(OutlineState::Closed, outline.state(), "seed {seed}");
        assert_eq!(6, outline.len());
        assert!(left.is_empty());

        // Consecutive members share end points after assembly.
        let members: Vec<&Curve> = outline.iter().collect();
        for pair in members.windows(2) {
            assert!(pair[0].end().distance(pair[1].start()) < MIN);
        }
    }
}

#[test]
fn gap_inside_tolerance_joins() {
    let mut outline = Outline::new(MIN);
    outline
        .add_segment(seg(1, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)))
        .unwrap();
    let near = seg(2, Vec2::new(10.0 + 0.009, 0.0), Vec2::new(10.0, 5.0));
    assert_eq!(
        Ok(Attachment::Append { reversed: false }),
        outline.add_segment(near).map_err(|c| c.id)
    );
}

#[test]
fn gap_outside_tolerance_is_rejected() {
    let mut outline = Outline::new(MIN);
    outline
        .add_segment(seg(1, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)))
        .unwrap();
    let far = seg(2, Vec2::new(10.0 + 0.011, 0.0), Vec2::new(10.0, 5.0));
    let rejected = outline.add_segment(far).unwrap_err();
    assert_eq!(2, rejected.id);
    assert_eq!(1, outline.len());
    assert_eq!(OutlineState::Open, outline.state());
}

#[test]
fn front_is_tried_before_back() {
    let mut outline = Outline::new(MIN);
    outline
        .add_segment(seg(1, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)))
        .unwrap();
    // Ends on the front and starts on the back: front wins.
    let both = seg(2, Vec2::new(10.0, 0.0), Vec2::new(0.0, 0.0));
    assert_eq!(
        Some(Attachment::Prepend { reversed: false }),
        outline.match_candidate(&both)
    );
}

#[test]
fn reversed_candidate_is_flipped_before_attach() {
    let mut outline = Outline::new(MIN);
    outline
        .add_segment(seg(1, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)))
        .unwrap();
    let backwards = seg(2, Vec2::new(10.0, 5.0), Vec2::new(10.0, 0.0));
    assert_eq!(
        Ok(Attachment::Append { reversed: true }),
        outline.add_segment(backwards).map_err(|c| c.id)
    );
    assert_eq!(Some(Vec2::new(10.0, 5.0)), outline.back_open());
}

#[test]
fn circle_only_as_sole_member() {
    let circle = Curve::circle(5, Vec2::new(0.0, 0.0), 2.0, MIN).unwrap();

    let mut alone = Outline::new(MIN);
    alone.add_segment(circle.clone()).unwrap();
    assert!(alone.is_closed());
    assert!(alone.add_segment(seg(6, Vec2::new(2.0, 0.0), Vec2::new(4.0, 0.0))).is_err());

    let mut chain = Outline::new(MIN);
    chain
        .add_segment(seg(1, Vec2::new(2.0, 0.0), Vec2::new(6.0, 0.0)))
        .unwrap();
    // Shares the circle's nominal start point but still never attaches.
    assert!(chain.add_segment(circle).is_err());
    assert_eq!(1, chain.len());
}

#[test]
fn closed_outline_contains_interior_points() {
    let square = polygon(&[
        Vec2::new(0.0, 0.0),
        Vec2::new(10.0, 0.0),
        Vec2::new(10.0, 10.0),
        Vec2::new(0.0, 10.0),
    ]);
    let (outline, _) = assemble(square);
    assert!(outline.contains_point(Vec2::new(5.0, 5.0)));
    assert!(!outline.contains_point(Vec2::new(15.0, 5.0)));

    let inner = polygon(&[
        Vec2::new(2.0, 2.0),
        Vec2::new(4.0, 2.0),
        Vec2::new(4.0, 4.0),
        Vec2::new(2.0, 4.0),
    ]);
    let (inner, _) = assemble(inner);
    assert!(outline.encloses(&inner));
    assert!(!inner.encloses(&outline));
}

#[test]
fn describe_lists_every_member() {
    let (outline, _) = assemble(vec![
        seg(11, Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)),
        seg(12, Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)),
    ]);
    let text = outline.describe();
    assert!(text.contains("line #11"));
    assert!(text.contains("line #12"));
    assert_eq!(2, text.lines().count());
}
