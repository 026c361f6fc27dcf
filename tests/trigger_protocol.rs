use cinder::errors::CinderError;
use cinder::trigger::protocol::{TOKEN_LENGTH, random_token};
use cinder::trigger::{Action, ENV_SOCKET_PORT, ENV_SOCKET_TOKEN, Request, Response, TriggerEndpoint};

const TOKEN: &str = "0123456789abcdefghijklmnopqrstuv";

#[test]
fn request_line_layout() {
    let request = Request::new(TOKEN, Action::Start, "my-project");
    assert_eq!(request.encode(), format!("{TOKEN} 1 10 my-project\n"));
}

#[test]
fn parse_accepts_a_well_formed_line() {
    let line = format!("{TOKEN} 1 5 hello\n");
    let request = Request::parse(&line, TOKEN).unwrap();

    assert_eq!(request.action, Action::Start);
    assert_eq!(request.payload, "hello");
    assert_eq!(request.token, TOKEN);
}

#[test]
fn payload_may_contain_spaces() {
    let sent = Request::new(TOKEN, Action::Start, "name with spaces");
    let parsed = Request::parse(&sent.encode(), TOKEN).unwrap();
    assert_eq!(parsed, sent);
}

#[test]
fn wrong_token_is_rejected() {
    let other = "x".repeat(TOKEN_LENGTH);
    let line = format!("{other} 1 5 hello\n");
    assert!(matches!(
        Request::parse(&line, TOKEN),
        Err(CinderError::ProtocolError(_))
    ));

    // A prefix of the right token is not enough either.
    let short = format!("{} 1 5 hello\n", &TOKEN[..10]);
    assert!(Request::parse(&short, TOKEN).is_err());
}

#[test]
fn length_mismatch_is_rejected() {
    let line = format!("{TOKEN} 1 4 hello\n");
    let err = Request::parse(&line, TOKEN).unwrap_err();
    assert!(err.to_string().contains("length"), "{err}");
}

#[test]
fn unknown_action_is_rejected() {
    let line = format!("{TOKEN} 7 5 hello\n");
    let err = Request::parse(&line, TOKEN).unwrap_err();
    assert!(err.to_string().contains("unknown action"), "{err}");
}

#[test]
fn malformed_lines_are_rejected() {
    for line in ["", "\n", TOKEN, &format!("{TOKEN} x 1 a"), &format!("{TOKEN} 1 y a")] {
        assert!(Request::parse(line, TOKEN).is_err(), "accepted {line:?}");
    }
}

#[test]
fn response_codes() {
    assert_eq!(Response::Ok.encode(), [0, b'\n']);
    assert_eq!(Response::Fail.encode(), [1, b'\n']);
    assert_eq!(Response::from_code(0), Response::Ok);
    assert_eq!(Response::from_code(1), Response::Fail);
    assert_eq!(Response::from_code(200), Response::Fail);
}

#[test]
fn action_codes() {
    assert_eq!(Action::Start.code(), 1);
    assert_eq!(Action::from_code(1), Some(Action::Start));
    assert_eq!(Action::from_code(0), None);
}

#[test]
fn tokens_are_random_lowercase_alphanumerics() {
    let a = random_token();
    let b = random_token();

    assert_eq!(a.len(), TOKEN_LENGTH);
    assert!(a.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    assert_ne!(a, b);
}

#[test]
fn endpoint_exports_its_environment() {
    let endpoint = TriggerEndpoint {
        port: 40123,
        token: TOKEN.to_string(),
    };
    let vars = endpoint.env_vars();

    assert_eq!(vars.get(ENV_SOCKET_PORT).map(String::as_str), Some("40123"));
    assert_eq!(vars.get(ENV_SOCKET_TOKEN).map(String::as_str), Some(TOKEN));
    assert_eq!(endpoint.address().to_string(), "127.0.0.1:40123");
}
