// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Parses the request line of a buffered management connection into a
//! [`Route`], the text-protocol analogue of `Command::from_u8` -- the
//! request reaches the slot as raw HTTP/1.0-style bytes rather than a
//! single command byte, so this pulls the method and path back out of it.

/// A recognized management request.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Route {
    Metrics,
    Health,
    NotFound,
}

/// Parse `"METHOD /path HTTP/1.x\r\n..."` into a [`Route`]. Anything that
/// doesn't parse as a well-formed request line, or whose path isn't
/// recognized, maps to [`Route::NotFound`].
pub fn parse_route(request: &[u8]) -> Route {
    let line_end = request.iter().position(|&b| b == b'\r' || b == b'\n').unwrap_or(request.len());
    let line = match std::str::from_utf8(&request[..line_end]) {
        Ok(s) => s,
        Err(_) => return Route::NotFound,
    };

    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    if !method.eq_ignore_ascii_case("GET") {
        return Route::NotFound;
    }

    match path {
        "/metrics" => Route::Metrics,
        "/health" => Route::Health,
        _ => Route::NotFound,
    }
}

/// Render a `200 OK` response header for a JSON body of `body_len` bytes.
pub fn ok_header(body_len: usize) -> Vec<u8> {
    format!("HTTP/1.0 200 OK\r\nContent-Type: application/json\r\nContent-Length: {body_len}\r\n\r\n").into_bytes()
}

/// Render a `404 Not Found` response with an empty body.
pub fn not_found_header() -> Vec<u8> {
    b"HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metrics_route() {
        assert_eq!(parse_route(b"GET /metrics HTTP/1.0\r\n\r\n"), Route::Metrics);
    }

    #[test]
    fn parses_health_route() {
        assert_eq!(parse_route(b"GET /health HTTP/1.0\r\n\r\n"), Route::Health);
    }

    #[test]
    fn unknown_path_is_not_found() {
        assert_eq!(parse_route(b"GET /bogus HTTP/1.0\r\n\r\n"), Route::NotFound);
    }

    #[test]
    fn non_get_method_is_not_found() {
        assert_eq!(parse_route(b"POST /metrics HTTP/1.0\r\n\r\n"), Route::NotFound);
    }

    #[test]
    fn malformed_request_is_not_found() {
        assert_eq!(parse_route(b""), Route::NotFound);
    }
}
