//! Estimate-then-align: the aligned candidate must land on the reference.

use longexpo_frame_model::{FillPolicy, Frame, Offset, Size};
use longexpo_registration::{
    align, FrameAligner, IdentityEstimator, PhaseCorrelationEstimator, RegistrationEstimator,
    RegistrationStatus,
};

/// Smooth blobs plus fine noise, so both the low and high bands carry signal.
fn scene(size: Size, dx: i64, dy: i64) -> Frame {
    Frame::from_fn(size, |x, y| {
        let (sx, sy) = (x as i64 - dx, y as i64 - dy);
        let blob = ((sx as f64 * 0.21).sin() * (sy as f64 * 0.17).cos() * 60.0) as i64;
        let h = (sx.wrapping_mul(73_856_093) ^ sy.wrapping_mul(19_349_663)) as u64;
        let noise = (h.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 59) as i64;
        let v = (128 + blob + noise).clamp(0, 255) as u8;
        [v, v, v, 255]
    })
    .unwrap()
}

fn assert_interior_matches(aligned: &Frame, reference: &Frame, margin: u32) {
    for y in margin..reference.height() - margin {
        for x in margin..reference.width() - margin {
            assert_eq!(aligned.pixel(x, y), reference.pixel(x, y), "pixel ({x}, {y})");
        }
    }
}

#[test]
fn test_estimated_offset_realigns_candidate() {
    let size = Size::new(120, 80);
    let reference = scene(size, 0, 0);
    let candidate = scene(size, 7, -5);

    let estimator = PhaseCorrelationEstimator::default();
    let registration = estimator.estimate(&reference, &candidate);
    assert_eq!(registration.status, RegistrationStatus::Registered);
    assert_eq!(registration.offset.rounded(), (7, -5));

    let (dx, dy) = registration.offset.rounded();
    let aligned = align(
        &candidate,
        Offset::new(dx as f64, dy as f64),
        size,
        FillPolicy::BLACK,
    )
    .unwrap();
    assert_interior_matches(&aligned.frame, &reference, 8);
}

#[test]
fn test_fractional_shift_is_recovered_to_sub_pixel() {
    let size = Size::new(120, 80);
    let reference = scene(size, 0, 0);
    let estimator = PhaseCorrelationEstimator::default();
    let prepared = estimator.prepare(&reference);

    for (dx, dy) in [(2.5, -1.5), (0.25, 0.75), (-1.75, 0.5), (3.4, 2.2), (-0.6, -4.3)] {
        // Sampling at p - d moves the content by +d.
        let candidate = align(&reference, Offset::new(-dx, -dy), size, FillPolicy::EdgeClamp)
            .unwrap()
            .frame;
        let registration = prepared.register(&candidate);

        assert_eq!(registration.status, RegistrationStatus::Registered);
        let (ex, ey) = (registration.offset.dx, registration.offset.dy);
        assert!(
            (ex - dx).abs() < 0.1 && (ey - dy).abs() < 0.1,
            "shift ({dx}, {dy}) registered as ({ex:.3}, {ey:.3})"
        );
    }
}

#[test]
fn test_reference_against_itself_is_exact_zero() {
    let reference = scene(Size::new(64, 64), 0, 0);
    let estimator: Box<dyn RegistrationEstimator> = Box::new(PhaseCorrelationEstimator::default());
    assert_eq!(estimator.estimate_offset(&reference, &reference), Offset::ZERO);
}

#[test]
fn test_prepared_reference_across_sequence() {
    let size = Size::new(96, 96);
    let reference = scene(size, 0, 0);
    let estimator = PhaseCorrelationEstimator::default();
    let prepared = estimator.prepare(&reference);
    let aligner = FrameAligner::new(size, FillPolicy::EdgeClamp);

    for (i, (dx, dy)) in [(0, 0), (2, 1), (-3, 4), (6, -2)].into_iter().enumerate() {
        let candidate = scene(size, dx, dy);
        let registration = prepared.register(&candidate);
        assert_eq!(registration.offset.rounded(), (dx, dy), "frame {i}");

        let (rx, ry) = registration.offset.rounded();
        let aligned = aligner
            .align(&candidate, Offset::new(rx as f64, ry as f64), i)
            .unwrap();
        assert_eq!(aligned.source_index, i);
        assert_interior_matches(&aligned.frame, &reference, 8);
    }
}

#[test]
fn test_identity_estimator_leaves_frames_unaligned() {
    let size = Size::new(32, 32);
    let reference = scene(size, 0, 0);
    let candidate = scene(size, 3, 3);
    let offset = IdentityEstimator.estimate_offset(&reference, &candidate);
    let aligned = align(&candidate, offset, size, FillPolicy::default()).unwrap();
    assert_eq!(aligned.frame, candidate);
}
