use rand::Rng;

pub struct Utility {}

impl Utility {
    /// 每个轴在 [-range, range] 度内均匀采样，按 x、y、z 顺序组合成旋转。
    #[inline]
    pub fn random_rotation<R: Rng + ?Sized>(
        range_deg: [f64; 3],
        rng: &mut R,
    ) -> nalgebra::UnitQuaternion<f64> {
        let roll = Self::uniform_sym(range_deg[0].abs(), rng).to_radians();
        let pitch = Self::uniform_sym(range_deg[1].abs(), rng).to_radians();
        let yaw = Self::uniform_sym(range_deg[2].abs(), rng).to_radians();
        nalgebra::UnitQuaternion::from_euler_angles(roll, pitch, yaw)
    }

    /// [-mag, mag] 内均匀采样
    #[inline]
    pub fn uniform_sym<R: Rng + ?Sized>(mag: f64, rng: &mut R) -> f64 {
        rng.gen_range(-1.0..=1.0) * mag
    }
}

#[test]
fn test_zero_range_rotation() {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
    let q = Utility::random_rotation([0.0; 3], &mut rng);
    assert!(q.angle().abs() < 1e-12);
}

#[test]
fn test_rotation_is_bounded() {
    use rand::SeedableRng;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
    for _ in 0..100 {
        let (r, p, y) = Utility::random_rotation([10.0, 20.0, 30.0], &mut rng).euler_angles();
        assert!(r.to_degrees().abs() <= 10.0 + 1e-9);
        assert!(p.to_degrees().abs() <= 20.0 + 1e-9);
        assert!(y.to_degrees().abs() <= 30.0 + 1e-9);
    }
}
