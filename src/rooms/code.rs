use rand::Rng;

pub const CODE_MIN: u16 = 1000;
pub const CODE_MAX: u16 = 9999;

/// Random attempts before falling back to a scan of the code space.
pub const RANDOM_ATTEMPTS: usize = 32;

/// A uniformly random 4-digit code in `[1000, 9999]`.
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(CODE_MIN..=CODE_MAX).to_string()
}

/// Candidate codes in creation order: random draws first, then every code once,
/// starting at a random offset.
pub fn candidates<R: Rng + ?Sized>(rng: &mut R) -> impl Iterator<Item = String> {
    let random: Vec<String> = (0..RANDOM_ATTEMPTS).map(|_| random_code(rng)).collect();
    let span = (CODE_MAX - CODE_MIN + 1) as u32;
    let offset = rng.gen_range(0..span);
    random.into_iter().chain(
        (0..span).map(move |i| (CODE_MIN as u32 + (offset + i) % span).to_string()),
    )
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == 4
        && code.bytes().all(|b| b.is_ascii_digit())
        && code.parse::<u16>().is_ok_and(|n| (CODE_MIN..=CODE_MAX).contains(&n))
}
