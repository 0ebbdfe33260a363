//! Aggregation of per-naming-context search results.

use dirsrv_types::ResultCode;

/// Running result of a search fanned out across several naming contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AggregateResult {
    code: ResultCode,
    message: String,
}

impl AggregateResult {
    /// Starts from the result of the node that owns the search base.
    pub(crate) fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Folds one subordinate result into the aggregate.
    ///
    /// | new            | current                               | outcome             |
    /// |----------------|---------------------------------------|---------------------|
    /// | any            | `Undefined`                           | new code            |
    /// | `Success`      | any                                   | unchanged           |
    /// | `NoSuchObject` | any                                   | unchanged           |
    /// | other          | `Success`, `NoSuchObject`, `Referral` | new code            |
    /// | other          | other error                           | message appended    |
    ///
    /// A `NoSuchObject` from the base context is deliberately kept when a
    /// subordinate succeeds, so a missing search base stays visible.
    pub(crate) fn merge(&mut self, code: ResultCode, message: &str) {
        if self.code == ResultCode::Undefined {
            self.code = code;
            message.clone_into(&mut self.message);
            return;
        }

        match code {
            ResultCode::Success | ResultCode::NoSuchObject | ResultCode::Undefined => {}
            _ => match self.code {
                ResultCode::Success | ResultCode::NoSuchObject | ResultCode::Referral => {
                    self.code = code;
                    message.clone_into(&mut self.message);
                }
                _ => self.append(message),
            },
        }
    }

    fn append(&mut self, message: &str) {
        if message.is_empty() {
            return;
        }
        if !self.message.is_empty() {
            self.message.push_str("; ");
        }
        self.message.push_str(message);
    }

    pub(crate) const fn code(&self) -> ResultCode {
        self.code
    }

    pub(crate) fn into_parts(self) -> (ResultCode, String) {
        (self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::undefined_adopts(ResultCode::Undefined, ResultCode::NoSuchObject, ResultCode::NoSuchObject)]
    #[case::success_kept(ResultCode::Success, ResultCode::Success, ResultCode::Success)]
    #[case::success_never_overrides(ResultCode::Busy, ResultCode::Success, ResultCode::Busy)]
    #[case::missing_base_survives_subordinate_success(ResultCode::NoSuchObject, ResultCode::Success, ResultCode::NoSuchObject)]
    #[case::missing_never_overrides(ResultCode::Success, ResultCode::NoSuchObject, ResultCode::Success)]
    #[case::error_replaces_success(ResultCode::Success, ResultCode::Busy, ResultCode::Busy)]
    #[case::error_replaces_missing(ResultCode::NoSuchObject, ResultCode::Other, ResultCode::Other)]
    #[case::error_replaces_referral(ResultCode::Referral, ResultCode::Busy, ResultCode::Busy)]
    #[case::first_error_kept(ResultCode::Busy, ResultCode::Other, ResultCode::Busy)]
    fn merge_follows_precedence(
        #[case] current: ResultCode,
        #[case] incoming: ResultCode,
        #[case] expected: ResultCode,
    ) {
        let mut aggregate = AggregateResult::new(current, "");
        aggregate.merge(incoming, "");
        assert_eq!(aggregate.code(), expected);
    }

    #[test]
    fn later_error_messages_are_appended() {
        let mut aggregate = AggregateResult::new(ResultCode::Busy, "first backend busy");
        aggregate.merge(ResultCode::Other, "second backend failed");
        aggregate.merge(ResultCode::Success, "ignored");

        let (code, message) = aggregate.into_parts();
        assert_eq!(code, ResultCode::Busy);
        assert_eq!(message, "first backend busy; second backend failed");
    }

    #[test]
    fn replacing_code_replaces_message() {
        let mut aggregate = AggregateResult::new(ResultCode::NoSuchObject, "no entry");
        aggregate.merge(ResultCode::Busy, "backend busy");

        assert_eq!(
            aggregate.into_parts(),
            (ResultCode::Busy, "backend busy".to_owned())
        );
    }
}
