/// For narrowing casts where business logic ensures that the value is in the narrower type's range.
/// NB: The implementations will panic otherwise
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}
impl PrecheckedCast<u16> for usize {
    fn prechecked_cast(self) -> u16 {
        self.try_into().expect("this is a bug: application logic should have ensured the value range")
    }
}

/// Saturating conversion for values coming off the wire or out of the state tree: out-of-range
///  values are pinned to the nearest bound of the target type.
pub trait SaturatingCast<T> {
    fn saturating_cast(self) -> T;
}
impl SaturatingCast<u16> for usize {
    fn saturating_cast(self) -> u16 {
        self.min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0, 0)]
    #[case::in_range(1404, 1404)]
    #[case::max(0xffff, 0xffff)]
    #[case::above(0x1_0000, 0xffff)]
    fn test_saturating_cast(#[case] value: usize, #[case] expected: u16) {
        let cast: u16 = value.saturating_cast();
        assert_eq!(cast, expected);
    }

    #[test]
    #[should_panic]
    fn test_prechecked_cast_out_of_range() {
        let _: u16 = 0x1_0000usize.prechecked_cast();
    }
}
