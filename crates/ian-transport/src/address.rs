use crate::error::{Result, TransportError};

/// Port an Artemis server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 2010;

/// Split `HOST[:PORT]` into host and port, defaulting to [`DEFAULT_PORT`].
///
/// IPv6 literals must be bracketed when a port is given (`[::1]:2010`); a
/// bare literal with several colons is taken as a host without port.
pub fn parse_address(input: &str) -> Result<(String, u16)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(invalid(input, "address must not be empty"));
    }

    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| invalid(input, "unterminated '[' in IPv6 address"))?;
        if host.is_empty() {
            return Err(invalid(input, "empty host"));
        }
        let port = match tail {
            "" => DEFAULT_PORT,
            _ => {
                let port = tail
                    .strip_prefix(':')
                    .ok_or_else(|| invalid(input, "expected ':' after ']'"))?;
                parse_port(input, port)?
            }
        };
        return Ok((host.to_string(), port));
    }

    match input.matches(':').count() {
        0 => Ok((input.to_string(), DEFAULT_PORT)),
        1 => {
            let (host, port) = input
                .split_once(':')
                .ok_or_else(|| invalid(input, "malformed address"))?;
            if host.is_empty() {
                return Err(invalid(input, "empty host"));
            }
            Ok((host.to_string(), parse_port(input, port)?))
        }
        _ => Ok((input.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) => Err(invalid(input, "port must be greater than zero")),
        Ok(port) => Ok(port),
        Err(err) => Err(invalid(input, &format!("invalid port '{port}': {err}"))),
    }
}

fn invalid(address: &str, reason: &str) -> TransportError {
    TransportError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}
