//! Decoding of single helper protocol lines.
//!
//! Lines are tab-separated with the command name first. Both decoders are
//! pure: they never touch a sink and never keep state between lines.

use pkd_schema::{
    ControlEvent, EnumLookup, PackageDescription, PackageFiles, PackageId, ProtocolEvent,
    RepoDetail, UpdateDetail, MAX_PACKAGE_SIZE,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid command '{command}': expected {expected} fields, found {found}")]
    Arity {
        command: String,
        expected: usize,
        found: usize,
    },
    #[error("invalid command '{0}'")]
    UnknownCommand(String),
    #[error("{kind} enum not recognised, and hence ignored: '{value}'")]
    UnknownEnum { kind: &'static str, value: String },
    #[error("invalid package id: {0}")]
    InvalidPackageId(#[from] pkd_schema::PackageIdError),
    #[error("invalid {field} value '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} value {value} out of range 0..=100")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("package size {0} exceeds the 1073741824 byte limit")]
    SizeTooLarge(u64),
    #[error("invalid section '{0}': expected 'true' or 'false'")]
    InvalidBoolean(String),
    #[error("command '{0}' is not handled by the helper protocol layer")]
    Rejected(String),
}

fn check_arity(fields: &[&str], expected: usize) -> Result<(), DecodeError> {
    if fields.len() == expected {
        Ok(())
    } else {
        Err(DecodeError::Arity {
            command: fields[0].to_owned(),
            expected,
            found: fields.len(),
        })
    }
}

fn resolve<T>(found: Option<T>, kind: &'static str, value: &str) -> Result<T, DecodeError> {
    found.ok_or_else(|| DecodeError::UnknownEnum {
        kind,
        value: value.to_owned(),
    })
}

fn parse_bool(text: &str) -> Result<bool, DecodeError> {
    match text {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(DecodeError::InvalidBoolean(other.to_owned())),
    }
}

fn parse_percent(field: &'static str, text: &str) -> Result<u8, DecodeError> {
    let value: i64 = text.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: text.to_owned(),
    })?;
    match u8::try_from(value) {
        Ok(percent) if percent <= 100 => Ok(percent),
        _ => Err(DecodeError::OutOfRange { field, value }),
    }
}

fn parse_size(text: &str) -> Result<u64, DecodeError> {
    let size: u64 = text.parse().map_err(|_| DecodeError::InvalidNumber {
        field: "size",
        value: text.to_owned(),
    })?;
    if size > MAX_PACKAGE_SIZE {
        return Err(DecodeError::SizeTooLarge(size));
    }
    Ok(size)
}

/// Decode one stdout line.
///
/// Returns `Ok(None)` for a line without any tab: such lines are not part of
/// the protocol and are skipped silently.
pub fn decode_output_line(
    line: &str,
    lookup: &dyn EnumLookup,
) -> Result<Option<ProtocolEvent>, DecodeError> {
    if !line.contains('\t') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();

    let event = match fields[0] {
        "package" => {
            check_arity(&fields, 4)?;
            let info = resolve(lookup.info(fields[1]), "Info", fields[1])?;
            ProtocolEvent::Package {
                info,
                package_id: PackageId::parse(fields[2])?,
                summary: fields[3].to_owned(),
            }
        }
        "description" => {
            check_arity(&fields, 7)?;
            ProtocolEvent::Description(PackageDescription {
                package_id: fields[1].to_owned(),
                license: fields[2].to_owned(),
                group: lookup.group(fields[3]),
                detail: fields[4].to_owned(),
                url: fields[5].to_owned(),
                size: parse_size(fields[6])?,
            })
        }
        "files" => {
            check_arity(&fields, 3)?;
            ProtocolEvent::Files(PackageFiles {
                package_id: fields[1].to_owned(),
                file_list: fields[2].to_owned(),
            })
        }
        "repo-detail" => {
            check_arity(&fields, 4)?;
            ProtocolEvent::RepoDetail(RepoDetail {
                repo_id: fields[1].to_owned(),
                description: fields[2].to_owned(),
                enabled: parse_bool(fields[3])?,
            })
        }
        "updatedetail" => {
            check_arity(&fields, 9)?;
            let restart = resolve(lookup.restart(fields[7]), "Restart", fields[7])?;
            ProtocolEvent::UpdateDetail(UpdateDetail {
                package_id: fields[1].to_owned(),
                updates: fields[2].to_owned(),
                obsoletes: fields[3].to_owned(),
                vendor_url: fields[4].to_owned(),
                bugzilla_url: fields[5].to_owned(),
                cve_url: fields[6].to_owned(),
                restart,
                update_text: fields[8].to_owned(),
            })
        }
        other => return Err(DecodeError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(event))
}

/// Decode one stderr line.
///
/// A tab-free line that does not start with a known command is helper
/// chatter and comes back as [`ControlEvent::Unrecognized`].
pub fn decode_error_line(line: &str, lookup: &dyn EnumLookup) -> Result<ControlEvent, DecodeError> {
    let fields: Vec<&str> = line.split('\t').collect();

    match fields[0] {
        "percentage" => {
            check_arity(&fields, 2)?;
            Ok(ControlEvent::Percentage(parse_percent("percentage", fields[1])?))
        }
        "subpercentage" => {
            check_arity(&fields, 2)?;
            Ok(ControlEvent::SubPercentage(parse_percent(
                "subpercentage",
                fields[1],
            )?))
        }
        "error" => {
            check_arity(&fields, 3)?;
            let kind = resolve(lookup.error(fields[1]), "Error", fields[1])?;
            Ok(ControlEvent::ErrorCode {
                kind,
                message: fields[2].replace(';', "\n"),
            })
        }
        "requirerestart" => {
            check_arity(&fields, 3)?;
            let kind = resolve(lookup.restart(fields[1]), "Restart", fields[1])?;
            Ok(ControlEvent::RequireRestart {
                kind,
                details: fields[2].to_owned(),
            })
        }
        "message" => {
            check_arity(&fields, 3)?;
            let kind = resolve(lookup.message(fields[1]), "Message", fields[1])?;
            Ok(ControlEvent::Message {
                kind,
                text: fields[2].to_owned(),
            })
        }
        "change-transaction-data" => {
            check_arity(&fields, 2)?;
            Ok(ControlEvent::TransactionDataChanged(fields[1].to_owned()))
        }
        "status" => {
            check_arity(&fields, 2)?;
            let kind = resolve(lookup.status(fields[1]), "Status", fields[1])?;
            Ok(ControlEvent::StatusChange(kind))
        }
        "allow-cancel" => {
            check_arity(&fields, 2)?;
            Ok(ControlEvent::AllowCancel(parse_bool(fields[1])?))
        }
        "no-percentage-updates" => {
            check_arity(&fields, 1)?;
            Ok(ControlEvent::NoPercentageUpdates)
        }
        "repo-signature-required" => Err(DecodeError::Rejected(fields[0].to_owned())),
        other if fields.len() > 1 => Err(DecodeError::UnknownCommand(other.to_owned())),
        _ => Ok(ControlEvent::Unrecognized(line.to_owned())),
    }
}
