pub fn random_u32() -> u32 {
    rand::random::<u32>()
}
