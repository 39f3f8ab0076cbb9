use thiserror::Error;

/// Failure kinds reported by a [`Fetcher`](crate::traits::Fetcher).
///
/// The numeric codes are part of the persisted dump format. A code, once
/// assigned, keeps its meaning forever; new kinds get new codes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchError {
    #[error("unknown fetch failure")]
    Unknown,
    #[error("request blocked")]
    Blocked,
    #[error("host not found")]
    NotFound,
    #[error("connection refused")]
    ConnRefused,
    #[error("unexpected redirect")]
    Redirect,
    #[error("truncated transfer")]
    Truncated,
    #[error("timed out")]
    TimedOut,

    #[error("certificate has expired")]
    CertHasExpired,
    #[error("unable to verify leaf signature")]
    UnableToVerifyLeafSignature,
    #[error("unable to get issuer certificate")]
    UnableToGetIssuerCert,
    #[error("unable to get certificate revocation list")]
    UnableToGetCrl,
    #[error("unable to decrypt certificate signature")]
    UnableToDecryptCertSignature,
    #[error("unable to decrypt CRL signature")]
    UnableToDecryptCrlSignature,
    #[error("unable to decode issuer public key")]
    UnableToDecodeIssuerPublicKey,
    #[error("certificate signature failure")]
    CertSignatureFailure,
    #[error("CRL signature failure")]
    CrlSignatureFailure,
    #[error("certificate is not yet valid")]
    CertNotYetValid,
    #[error("CRL is not yet valid")]
    CrlNotYetValid,
    #[error("CRL has expired")]
    CrlHasExpired,
    #[error("format error in certificate notBefore field")]
    ErrorInCertNotBeforeField,
    #[error("format error in certificate notAfter field")]
    ErrorInCertNotAfterField,
    #[error("format error in CRL lastUpdate field")]
    ErrorInCrlLastUpdateField,
    #[error("format error in CRL nextUpdate field")]
    ErrorInCrlNextUpdateField,
    #[error("out of memory during verification")]
    OutOfMem,
    #[error("self-signed certificate")]
    DepthZeroSelfSignedCert,
    #[error("self-signed certificate in chain")]
    SelfSignedCertInChain,
    #[error("unable to get local issuer certificate")]
    UnableToGetIssuerCertLocally,
    #[error("certificate chain too long")]
    CertChainTooLong,
    #[error("certificate revoked")]
    CertRevoked,
    #[error("invalid CA certificate")]
    InvalidCa,
    #[error("path length constraint exceeded")]
    PathLengthExceeded,
    #[error("unsupported certificate purpose")]
    InvalidPurpose,
    #[error("certificate not trusted")]
    CertUntrusted,
    #[error("certificate rejected")]
    CertRejected,
}

impl FetchError {
    /// Every kind, in code order.
    pub const ALL: [FetchError; 34] = [
        FetchError::Unknown,
        FetchError::Blocked,
        FetchError::NotFound,
        FetchError::ConnRefused,
        FetchError::Redirect,
        FetchError::Truncated,
        FetchError::TimedOut,
        FetchError::CertHasExpired,
        FetchError::UnableToVerifyLeafSignature,
        FetchError::UnableToGetIssuerCert,
        FetchError::UnableToGetCrl,
        FetchError::UnableToDecryptCertSignature,
        FetchError::UnableToDecryptCrlSignature,
        FetchError::UnableToDecodeIssuerPublicKey,
        FetchError::CertSignatureFailure,
        FetchError::CrlSignatureFailure,
        FetchError::CertNotYetValid,
        FetchError::CrlNotYetValid,
        FetchError::CrlHasExpired,
        FetchError::ErrorInCertNotBeforeField,
        FetchError::ErrorInCertNotAfterField,
        FetchError::ErrorInCrlLastUpdateField,
        FetchError::ErrorInCrlNextUpdateField,
        FetchError::OutOfMem,
        FetchError::DepthZeroSelfSignedCert,
        FetchError::SelfSignedCertInChain,
        FetchError::UnableToGetIssuerCertLocally,
        FetchError::CertChainTooLong,
        FetchError::CertRevoked,
        FetchError::InvalidCa,
        FetchError::PathLengthExceeded,
        FetchError::InvalidPurpose,
        FetchError::CertUntrusted,
        FetchError::CertRejected,
    ];

    /// Stable persisted code.
    pub fn code(&self) -> i32 {
        match self {
            FetchError::Unknown => -12400,
            FetchError::Blocked => -12401,
            FetchError::NotFound => -12402,
            FetchError::ConnRefused => -12403,
            FetchError::Redirect => -12404,
            FetchError::Truncated => -12405,
            FetchError::TimedOut => -12406,

            FetchError::CertHasExpired => -12501,
            FetchError::UnableToVerifyLeafSignature => -12502,
            FetchError::UnableToGetIssuerCert => -12503,
            FetchError::UnableToGetCrl => -12504,
            FetchError::UnableToDecryptCertSignature => -12505,
            FetchError::UnableToDecryptCrlSignature => -12506,
            FetchError::UnableToDecodeIssuerPublicKey => -12507,
            FetchError::CertSignatureFailure => -12508,
            FetchError::CrlSignatureFailure => -12509,
            FetchError::CertNotYetValid => -12510,
            FetchError::CrlNotYetValid => -12511,
            FetchError::CrlHasExpired => -12512,
            FetchError::ErrorInCertNotBeforeField => -12513,
            FetchError::ErrorInCertNotAfterField => -12514,
            FetchError::ErrorInCrlLastUpdateField => -12515,
            FetchError::ErrorInCrlNextUpdateField => -12516,
            FetchError::OutOfMem => -12517,
            FetchError::DepthZeroSelfSignedCert => -12518,
            FetchError::SelfSignedCertInChain => -12519,
            FetchError::UnableToGetIssuerCertLocally => -12520,
            FetchError::CertChainTooLong => -12521,
            FetchError::CertRevoked => -12522,
            FetchError::InvalidCa => -12523,
            FetchError::PathLengthExceeded => -12524,
            FetchError::InvalidPurpose => -12525,
            FetchError::CertUntrusted => -12526,
            FetchError::CertRejected => -12527,
        }
    }

    pub fn from_code(code: i32) -> Option<FetchError> {
        Self::ALL.iter().copied().find(|e| e.code() == code)
    }

    /// True for the certificate-chain verification family.
    pub fn is_certificate(&self) -> bool {
        self.code() <= -12501
    }
}
