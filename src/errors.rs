//! Error types shared across the wire and service layers.

use thiserror::Error;

/// Errors raised while decoding, encoding, or pumping the legacy protocol.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed stream: {0}")]
    Malformed(&'static str),

    #[error("unknown creatable type 0x{0:04X}")]
    UnknownCreatable(u16),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("peer hung up")]
    Hangup,

    #[error("shutting down")]
    Shutdown,
}

pub type NetResult<T> = Result<T, NetError>;

/// Result codes understood by the legacy client. The numeric values are part
/// of the wire protocol and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NetResultCode {
    NetSuccess = 0,
    NetInternalError = 1,
    NetTimeout = 2,
    NetBadServerData = 3,
    NetAgeNotFound = 4,
    NetConnectFailed = 5,
    NetDisconnected = 6,
    NetFileNotFound = 7,
    NetOldBuildId = 8,
    NetRemoteShutdown = 9,
    NetTimeoutOdbc = 10,
    NetAccountAlreadyExists = 11,
    NetAccountNotFound = 12,
    NetAccountNotActivated = 13,
    NetAccountBanned = 14,
    NetAccountLoginDenied = 15,
    NetKickedByCCR = 16,
    NetScoreWrongType = 17,
    NetScoreNotEnoughPoints = 18,
    NetScoreAlreadyExists = 19,
    NetScoreNoDataFound = 20,
    NetInviteNoMatchingPlayer = 21,
    NetInviteTooManyHoods = 22,
    NetNeedToPay = 23,
    NetServerBusy = 24,
    NetVaultNodeNotFound = 25,
    NetVaultNodeAccessViolation = 26,
    NetAuthTokenTooOld = 27,
    NetMustUseGameTapClient = 28,
    NetTooManyFailedLogins = 29,
    NetGameTapConnectionFailed = 30,
    NetGameTapTooManyAuthOptions = 31,
    NetGameTapMissingParameter = 32,
    NetGameTapServerError = 33,
    NetAuthenticationFailed = 34,
    NetPlayerAlreadyExists = 35,
    NetPlayerNotFound = 36,
    NetInvalidParameter = 37,
    NetNameLookupFailed = 38,
    NetLoggedInElsewhere = 39,
    NetPlayerNameInvalid = 40,
    NetNotSupported = 41,
    NetServiceForbidden = 42,
}

impl NetResultCode {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_codes_are_wire_stable() {
        assert_eq!(NetResultCode::NetSuccess.to_u32(), 0);
        assert_eq!(NetResultCode::NetFileNotFound.to_u32(), 7);
        assert_eq!(NetResultCode::NetAuthenticationFailed.to_u32(), 34);
        assert_eq!(NetResultCode::NetPlayerAlreadyExists.to_u32(), 35);
        assert_eq!(NetResultCode::NetInvalidParameter.to_u32(), 37);
    }
}
