//! Negative response codes
//!
//! KWP2000 and GMLAN share the code space for everything the logger and the
//! flash engine care about, so one table serves both protocols.

use std::fmt;

macro_rules! nrc_table {
    ($($name:ident = $code:literal, $text:literal;)+) => {
        /// Reason byte of a `7F <sid> <nrc>` reply
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum NegativeResponseCode {
            $($name,)+
            /// Reserved or manufacturer specific
            Unknown(u8),
        }

        impl From<u8> for NegativeResponseCode {
            fn from(code: u8) -> Self {
                match code {
                    $($code => Self::$name,)+
                    other => Self::Unknown(other),
                }
            }
        }

        impl From<NegativeResponseCode> for u8 {
            fn from(nrc: NegativeResponseCode) -> Self {
                match nrc {
                    $(NegativeResponseCode::$name => $code,)+
                    NegativeResponseCode::Unknown(code) => code,
                }
            }
        }

        impl NegativeResponseCode {
            /// Short operator-facing description
            pub fn description(&self) -> &'static str {
                match self {
                    $(Self::$name => $text,)+
                    Self::Unknown(_) => "unknown reason",
                }
            }
        }
    };
}

nrc_table! {
    GeneralReject = 0x10, "general reject";
    ServiceNotSupported = 0x11, "service not supported";
    SubFunctionNotSupported = 0x12, "sub-function not supported";
    BusyRepeatRequest = 0x21, "busy, repeat request";
    ConditionsNotCorrect = 0x22, "conditions not correct";
    RoutineNotComplete = 0x23, "routine not complete";
    RequestOutOfRange = 0x31, "request out of range";
    SecurityAccessDenied = 0x33, "security access denied";
    InvalidKey = 0x35, "invalid key";
    ExceededNumberOfAttempts = 0x36, "exceeded number of attempts";
    RequiredTimeDelayNotExpired = 0x37, "required time delay not expired";
    DownloadNotAccepted = 0x40, "download not accepted";
    UploadNotAccepted = 0x50, "upload not accepted";
    TransferSuspended = 0x71, "transfer suspended";
    GeneralProgrammingFailure = 0x72, "general programming failure";
    ResponsePending = 0x78, "response pending";
    ServiceNotSupportedInActiveSession = 0x80, "service not supported in active session";
}

impl fmt::UpperHex for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&u8::from(*self), f)
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
