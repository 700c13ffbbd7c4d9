//! Deterministic transition guards for case statuses.

use crate::domain::case_status::CaseStatus;
use crate::error::TransitionError;

/// Return the statuses `from` is allowed to move to.
const fn allowed_successors(from: CaseStatus) -> &'static [CaseStatus] {
    use CaseStatus::*;
    match from {
        New => &[R1AckProcessing],
        R1AckProcessing => &[Extracting],
        Extracting => &[LlmStruct, Failed],
        LlmStruct => &[LlmSuggest, Failed],
        LlmSuggest => &[R2PostWidget, Failed],
        R2PostWidget => &[WaitDoctor],
        WaitDoctor => &[DoctorDenied, DoctorAccepted],
        DoctorDenied => &[WaitR1CleanupThumbs],
        DoctorAccepted => &[R3PostRequest],
        R3PostRequest => &[WaitAppt],
        WaitAppt => &[ApptConfirmed, ApptDenied],
        ApptConfirmed => &[WaitR1CleanupThumbs],
        ApptDenied => &[WaitR1CleanupThumbs],
        Failed => &[WaitR1CleanupThumbs],
        // Compatibility status; runtime still transitions to WaitR1CleanupThumbs directly.
        R1FinalReplyPosted => &[WaitR1CleanupThumbs],
        WaitR1CleanupThumbs => &[CleanupRunning],
        CleanupRunning => &[Cleaned],
        Cleaned => &[],
    }
}

/// Return whether the transition is valid for the case state machine.
pub fn can_transition(from: CaseStatus, to: CaseStatus) -> bool {
    allowed_successors(from).contains(&to)
}

/// Assert a transition is allowed, else return a deterministic domain error.
pub fn assert_transition(from: CaseStatus, to: CaseStatus) -> Result<(), TransitionError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case_status::CaseStatus::*;

    #[test]
    fn happy_path_chain_is_allowed() {
        let chain = [
            New,
            R1AckProcessing,
            Extracting,
            LlmStruct,
            LlmSuggest,
            R2PostWidget,
            WaitDoctor,
            DoctorAccepted,
            R3PostRequest,
            WaitAppt,
            ApptConfirmed,
            WaitR1CleanupThumbs,
            CleanupRunning,
            Cleaned,
        ];
        for pair in chain.windows(2) {
            assert!(can_transition(pair[0], pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn cleaned_is_terminal() {
        for status in CaseStatus::ALL {
            assert!(!can_transition(Cleaned, *status));
        }
    }

    #[test]
    fn rejects_skipping_stages() {
        assert!(!can_transition(New, Extracting));
        assert!(assert_transition(New, Extracting).is_err());
    }

    #[test]
    fn every_status_has_a_total_entry_including_legacy_variant() {
        // can_transition must not panic for any (from, to) pair, including the
        // legacy R1_FINAL_REPLY_POSTED value no handler produces.
        for from in CaseStatus::ALL {
            for to in CaseStatus::ALL {
                let _ = can_transition(*from, *to);
            }
        }
        assert!(can_transition(R1FinalReplyPosted, WaitR1CleanupThumbs));
    }

    #[test]
    fn denied_paths_converge_on_cleanup_wait() {
        assert!(can_transition(DoctorDenied, WaitR1CleanupThumbs));
        assert!(can_transition(ApptDenied, WaitR1CleanupThumbs));
        assert!(can_transition(Failed, WaitR1CleanupThumbs));
    }
}
