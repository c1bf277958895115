// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Validity-window checks over ASN.1 times.
//!
//! Certificates encode their validity bounds either as `UTCTime` (two-digit
//! year) or `GeneralizedTime` (four-digit year). Decoding follows RFC 5280:
//! two-digit years 00 through 49 are 2000 through 2049 and 50 through 99 are
//! 1950 through 1999.
//!
//! `der` cannot represent instants before the Unix epoch, so certificate
//! bounds are also parsed from their raw encoding by [`parse_time`] into
//! signed [`EpochSeconds`].

use crate::UnixTimestamp;
use chrono::NaiveDate;
use der::{asn1::GeneralizedTime, Error as DerError, Tag};
use x509_cert::{time::Time, Certificate};

/// Seconds relative to the Unix epoch; negative before it.
pub type EpochSeconds = i64;

/// Tolerance applied on both sides of a validity window, in seconds.
pub const CLOCK_SKEW_SECS: EpochSeconds = 60;

/// Where an instant falls relative to a validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    Before,
    Within,
    After,
}

/// Converts a certificate time to seconds since the Unix epoch.
pub fn time_to_unix(time: &Time) -> UnixTimestamp {
    time.to_unix_duration().as_secs()
}

/// Converts a `GeneralizedTime` to seconds since the Unix epoch.
pub fn generalized_to_unix(time: &GeneralizedTime) -> UnixTimestamp {
    time.to_unix_duration().as_secs()
}

pub(crate) fn to_epoch(at: UnixTimestamp) -> EpochSeconds {
    EpochSeconds::try_from(at).unwrap_or(EpochSeconds::MAX)
}

/// Parses the content octets of a DER `UTCTime` (`YYMMDDHHMMSSZ`) or
/// `GeneralizedTime` (`YYYYMMDDHHMMSSZ`).
///
/// # Errors
///
/// Returns an error for any other tag, a non-canonical encoding, or a
/// calendar date or time of day that does not exist.
pub fn parse_time(tag: Tag, value: &[u8]) -> Result<EpochSeconds, DerError> {
    let (year, rest) = match (tag, value.len()) {
        (Tag::UtcTime, 13) => {
            let yy = digits(tag, &value[..2])?;
            (if yy < 50 { 2000 + yy } else { 1900 + yy }, &value[2..])
        }
        (Tag::GeneralizedTime, 15) => (digits(tag, &value[..4])?, &value[4..]),
        (Tag::UtcTime | Tag::GeneralizedTime, _) => return Err(tag.length_error()),
        _ => return Err(tag.unexpected_error(None)),
    };
    if rest[10] != b'Z' {
        return Err(tag.value_error());
    }
    let mut fields = [0u32; 5];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = u32::from(digits(tag, &rest[2 * i..2 * i + 2])?);
    }
    let [month, day, hour, minute, second] = fields;
    NaiveDate::from_ymd_opt(i32::from(year), month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|time| time.and_utc().timestamp())
        .ok_or_else(|| tag.value_error())
}

fn digits(tag: Tag, ascii: &[u8]) -> Result<u16, DerError> {
    ascii.iter().try_fold(0u16, |acc, &b| {
        if b.is_ascii_digit() {
            Ok(acc * 10 + u16::from(b - b'0'))
        } else {
            Err(tag.value_error())
        }
    })
}

/// Places `at` relative to `[start - skew, end + skew]`. Both bounds are
/// inclusive. A missing `end` leaves the window open.
pub fn window_position(
    at: EpochSeconds,
    start: EpochSeconds,
    end: Option<EpochSeconds>,
) -> WindowPosition {
    if at.saturating_add(CLOCK_SKEW_SECS) < start {
        WindowPosition::Before
    } else if end.is_some_and(|end| at > end.saturating_add(CLOCK_SKEW_SECS)) {
        WindowPosition::After
    } else {
        WindowPosition::Within
    }
}

/// Places `at` relative to the certificate's validity period.
pub fn validity_position(cert: &Certificate, at: UnixTimestamp) -> WindowPosition {
    let validity = &cert.tbs_certificate.validity;
    window_position(
        to_epoch(at),
        to_epoch(time_to_unix(&validity.not_before)),
        Some(to_epoch(time_to_unix(&validity.not_after))),
    )
}
