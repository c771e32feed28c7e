/// Strict majority: more than half of `total`.
pub(crate) fn is_majority(
    num: usize,
    total: usize,
) -> bool {
    num > total / 2
}
