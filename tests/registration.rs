//! Properties of registration on synthetic frames

use kinect_registration::{
    ColorParams, Frame, FrameFormat, IrParams, Registration, COLOR_HEIGHT, COLOR_SIZE,
    COLOR_WIDTH, DEPTH_HEIGHT, DEPTH_SIZE, DEPTH_WIDTH,
};
use proptest::prelude::*;

fn registration() -> Registration {
    let ir = IrParams {
        fx: 365.456,
        fy: 365.456,
        cx: 254.878,
        cy: 205.395,
        k1: 0.0905474,
        k2: -0.26819,
        k3: 0.0950862,
        p1: 0.0,
        p2: 0.0,
    };
    let color = ColorParams {
        fx: 1081.37,
        fy: 1081.37,
        cx: 959.5,
        cy: 539.5,
        shift_d: 863.0,
        shift_m: 52.0,
        mx_x1y0: 0.6353,
        mx_x0y0: 0.1405,
        my_x0y1: 0.6353,
        ..Default::default()
    };

    Registration::from_params(ir, color).expect("Failed to create registration")
}

fn color_frame() -> Frame {
    let buffer = (0..COLOR_SIZE)
        .flat_map(|i| [(i % 251) as u8 + 1, (i % 241) as u8, (i % 239) as u8, 255])
        .collect();

    Frame::from_pixels(COLOR_WIDTH, COLOR_HEIGHT, FrameFormat::BGRX, buffer).unwrap()
}

fn is_blank(frame: &Frame, i: usize) -> bool {
    frame.pixel(i).iter().all(|&b| b == 0)
}

fn invalid_depth() -> impl Strategy<Value = f32> {
    prop_oneof![
        Just(0.0f32),
        Just(f32::NAN),
        Just(f32::INFINITY),
        Just(f32::NEG_INFINITY),
        -5000.0f32..0.0,
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn invalid_depth_propagates_everywhere(
        base in 500.0f32..4500.0,
        holes in prop::collection::vec((0..DEPTH_SIZE, invalid_depth()), 1..64),
    ) {
        let registration = registration();
        let mut depth = vec![base; DEPTH_SIZE];
        for &(i, z) in &holes {
            depth[i] = z;
        }
        let depth = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &depth).unwrap();

        let undistorted_depth = registration.undistort_depth(&depth).unwrap();
        let result = registration.apply(&color_frame(), &depth, true, false).unwrap();
        let points = registration.points_array_for(&result.undistorted).unwrap();

        for i in 0..DEPTH_SIZE {
            let z = result.undistorted.depth_at(i);
            prop_assert!(z.is_nan() || z == base);
            prop_assert_eq!(z.is_nan(), undistorted_depth.depth_at(i).is_nan());

            if z.is_nan() {
                prop_assert!(is_blank(&result.registered, i));
                prop_assert!(points.points()[i].iter().all(|v| v.is_nan()));
            }
        }
    }

    #[test]
    fn points_keep_depth_and_scale_linearly(
        depth in 500.0f32..4500.0,
        row in 0..DEPTH_HEIGHT,
        col in 0..DEPTH_WIDTH,
    ) {
        let registration = registration();
        let ir = *registration.calibration().ir_params();
        let undistorted = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &vec![depth; DEPTH_SIZE]).unwrap();

        let (xs, ys, zs) = registration.points_for(&undistorted, &[row], &[col]).unwrap();

        prop_assert_eq!(zs[0], depth);
        prop_assert!((xs[0] * ir.fx / depth - (col as f32 - ir.cx)).abs() < 1e-2);
        prop_assert!((ys[0] * ir.fy / depth - (row as f32 - ir.cy)).abs() < 1e-2);
    }

    #[test]
    fn filter_only_hides_more(
        near in 400.0f32..1500.0,
        far in 2000.0f32..4500.0,
        edge in 100..400usize,
    ) {
        let registration = registration();
        let color = color_frame();
        let depth: Vec<f32> = (0..DEPTH_SIZE)
            .map(|i| if i % DEPTH_WIDTH < edge { near } else { far })
            .collect();
        let depth = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &depth).unwrap();

        let unfiltered = registration.apply(&color, &depth, false, false).unwrap();
        let filtered = registration.apply(&color, &depth, true, false).unwrap();

        for i in 0..DEPTH_SIZE {
            if is_blank(&unfiltered.registered, i) {
                prop_assert!(is_blank(&filtered.registered, i));
            } else if !is_blank(&filtered.registered, i) {
                prop_assert_eq!(filtered.registered.pixel(i), unfiltered.registered.pixel(i));
            }
        }
    }
}

#[test]
fn output_frames_have_fixed_size_for_any_content() {
    let registration = registration();
    let color = color_frame();

    for fill in [0.0, 800.0, f32::NAN] {
        let depth = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &vec![fill; DEPTH_SIZE]).unwrap();
        let result = registration.apply(&color, &depth, true, true).unwrap();

        assert_eq!(result.undistorted.buffer.len(), 512 * 424 * 4);
        assert_eq!(result.registered.buffer.len(), 512 * 424 * 4);
        assert_eq!(result.big_depth.unwrap().buffer.len(), 1920 * 1082 * 4);
    }
}

#[test]
fn metadata_follows_the_source_frames() {
    let registration = registration();
    let mut color = color_frame();
    color.sequence = 17;
    color.exposure = 12.5;
    let mut depth = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &vec![1000.0; DEPTH_SIZE]).unwrap();
    depth.sequence = 42;
    depth.timestamp = 9000;

    let result = registration.apply(&color, &depth, true, true).unwrap();

    assert_eq!(result.undistorted.sequence, 42);
    assert_eq!(result.undistorted.timestamp, 9000);
    assert_eq!(result.undistorted.format, FrameFormat::Float);
    assert_eq!(result.registered.sequence, 17);
    assert_eq!(result.registered.exposure, 12.5);
    assert_eq!(result.big_depth.unwrap().sequence, 42);
}

#[test]
fn raw_depth_frames_are_accepted() {
    let registration = registration();
    let mut depth = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &vec![1000.0; DEPTH_SIZE]).unwrap();
    depth.format = FrameFormat::Raw;

    assert!(registration.apply(&color_frame(), &depth, true, false).is_ok());
}
