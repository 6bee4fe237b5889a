use log::{info, warn};
use sideline_common::portal::{PortalClient, VerifyOutcome, schedule::ScheduleId};
use thiserror::Error;

/// Verification attempts allowed per challenge. Requesting a fresh code does
/// not refill the budget.
pub const ATTEMPT_BUDGET: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Unrequested,
    CodeSent { code_length: u8, countdown: u16 },
    Verifying { code_length: u8, countdown: u16 },
    Granted,
    Locked,
}

/// Rejected before any network call; consumes neither an attempt nor the
/// countdown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("no active code, request a new one")]
    NoActiveCode,
    #[error("the code must not be empty")]
    Empty,
    #[error("the code must be exactly {expected} characters")]
    WrongLength { expected: u8 },
}

/// Outcome of one verify round trip, as surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyAttempt {
    Granted,
    Rejected { attempts_left: u8 },
    Locked,
    /// The server was never reached; nothing was consumed.
    TryAgain,
}

/// One-time-code gate in front of a match session. The attempt counter and
/// the countdown are independent pieces of state with one transition
/// function each: `record_rejection` and `tick`.
#[derive(Debug)]
pub struct AccessChallenge {
    state: ChallengeState,
    attempts_left: u8,
}

impl AccessChallenge {
    pub fn new() -> Self {
        Self {
            state: ChallengeState::Unrequested,
            attempts_left: ATTEMPT_BUDGET,
        }
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn attempts_left(&self) -> u8 {
        self.attempts_left
    }

    pub fn is_granted(&self) -> bool {
        self.state == ChallengeState::Granted
    }

    pub fn is_locked(&self) -> bool {
        self.state == ChallengeState::Locked
    }

    pub async fn request_code(
        &mut self,
        portal: &PortalClient,
        schedule_id: ScheduleId,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let challenge = portal.request_access_code(schedule_id).await?;
        self.code_received(challenge.code_length, challenge.timeout_seconds);
        Ok(())
    }

    pub fn code_received(&mut self, code_length: u8, timeout_seconds: u16) {
        info!("Code of {code_length} characters sent, entry window {timeout_seconds}s");
        self.state = ChallengeState::CodeSent {
            code_length,
            countdown: timeout_seconds,
        };
    }

    /// One countdown second. Expiry disables entry until a new code request.
    pub fn tick(&mut self) {
        if let ChallengeState::CodeSent {
            code_length,
            countdown,
        } = self.state
        {
            let countdown = countdown.saturating_sub(1);
            self.state = if countdown == 0 {
                info!("Access code expired, a new code must be requested");
                ChallengeState::Unrequested
            } else {
                ChallengeState::CodeSent {
                    code_length,
                    countdown,
                }
            };
        }
    }

    pub fn validate(&self, code: &str) -> Result<(), CodeError> {
        let code_length = match self.state {
            ChallengeState::CodeSent { code_length, .. }
            | ChallengeState::Verifying { code_length, .. } => code_length,
            _ => return Err(CodeError::NoActiveCode),
        };
        if code.is_empty() {
            return Err(CodeError::Empty);
        }
        if code.chars().count() != usize::from(code_length) {
            return Err(CodeError::WrongLength {
                expected: code_length,
            });
        }
        Ok(())
    }

    /// Sends a well-formed code to the server. Exactly one attempt is
    /// consumed per call that reaches the server; validation failures and
    /// transport failures consume none.
    pub async fn verify(
        &mut self,
        portal: &PortalClient,
        schedule_id: ScheduleId,
        code: &str,
    ) -> Result<VerifyAttempt, CodeError> {
        self.validate(code)?;
        let ChallengeState::CodeSent {
            code_length,
            countdown,
        } = self.state
        else {
            return Err(CodeError::NoActiveCode);
        };
        self.state = ChallengeState::Verifying {
            code_length,
            countdown,
        };

        match portal.verify_access_code(schedule_id, code).await {
            Ok(VerifyOutcome::Success) => {
                info!("Access granted");
                self.state = ChallengeState::Granted;
                Ok(VerifyAttempt::Granted)
            }
            Ok(VerifyOutcome::Rejected(message)) => {
                warn!("Access code rejected: {message}");
                Ok(self.record_rejection())
            }
            Err(e) => {
                warn!("Code verification never reached the server: {e}");
                self.state = ChallengeState::CodeSent {
                    code_length,
                    countdown,
                };
                Ok(VerifyAttempt::TryAgain)
            }
        }
    }

    /// One attempt per server-reaching rejection; at zero the challenge
    /// locks and must be closed.
    fn record_rejection(&mut self) -> VerifyAttempt {
        self.attempts_left = self.attempts_left.saturating_sub(1);
        if self.attempts_left == 0 {
            self.state = ChallengeState::Locked;
            return VerifyAttempt::Locked;
        }
        if let ChallengeState::Verifying {
            code_length,
            countdown,
        } = self.state
        {
            self.state = ChallengeState::CodeSent {
                code_length,
                countdown,
            };
        }
        VerifyAttempt::Rejected {
            attempts_left: self.attempts_left,
        }
    }
}

impl Default for AccessChallenge {
    fn default() -> Self {
        Self::new()
    }
}
