use std::num::NonZeroUsize;

use crate::shared::ValidationError;

/// Validates a caller supplied page size.
///
/// Page sizes arrive as signed integers from the invocation surface; anything not strictly
/// positive is rejected before any work starts.
pub fn validate_page_size(page_size: i64) -> Result<NonZeroUsize, ValidationError> {
    if page_size <= 0 {
        return Err(ValidationError::InvalidPageSize(page_size));
    }

    let page_size =
        usize::try_from(page_size).map_err(|_| ValidationError::PageSizeTooLarge(page_size))?;

    NonZeroUsize::new(page_size).ok_or(ValidationError::InvalidPageSize(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_positive_page_sizes() {
        assert_eq!(validate_page_size(1).unwrap().get(), 1);
        assert_eq!(validate_page_size(1000).unwrap().get(), 1000);
    }

    #[test]
    fn rejects_zero_and_negative_page_sizes() {
        assert_eq!(
            validate_page_size(0),
            Err(ValidationError::InvalidPageSize(0))
        );
        assert_eq!(
            validate_page_size(-5),
            Err(ValidationError::InvalidPageSize(-5))
        );
    }
}
