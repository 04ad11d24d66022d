use super::{CommandKey, CommandRouter, Registry};
use crate::dispatcher::handler_fn;
use crate::error::RegistryError;
use crate::message::{DataType, EventResult, Response};

fn tagged(tag: &'static str) -> impl crate::dispatcher::EventHandler {
    handler_fn(tag, move |_req| {
        Ok(EventResult::Response(
            Response::ok(DataType::Json).with_body(tag),
        ))
    })
}

fn sample_router() -> CommandRouter {
    let registry = Registry::builder()
        .default_handler(tagged("a"))
        .route("/", tagged("b"))
        .route("/foo", tagged("c"))
        .route("/foo/bar", tagged("d"))
        .route("/bar", tagged("e"))
        .route("bar", tagged("f"))
        .build()
        .unwrap();
    CommandRouter::new(registry)
}

#[test]
fn test_null_path_is_default() {
    let router = sample_router();
    assert_eq!(router.identify_command(None), CommandKey::Default);
    assert_eq!(router.get_event(None).name(), "a");
}

#[test]
fn test_longest_prefix_wins() {
    let router = sample_router();
    assert_eq!(router.identify_command(Some("/baz")), CommandKey::prefix("/"));
    assert_eq!(
        router.identify_command(Some("/foo/baz")),
        CommandKey::prefix("/foo")
    );
    assert_eq!(
        router.identify_command(Some("/foo/bar/baz")),
        CommandKey::prefix("/foo/bar")
    );
    assert_eq!(
        router.identify_command(Some("/foo/bar")),
        CommandKey::prefix("/foo/bar")
    );
}

#[test]
fn test_empty_segments_are_ignored() {
    let router = sample_router();
    assert_eq!(
        router.identify_command(Some("/bar//foo/")),
        CommandKey::prefix("/bar")
    );
    assert_eq!(
        router.identify_command(Some("//foo///bar//")),
        CommandKey::prefix("/foo/bar")
    );
}

#[test]
fn test_undelimited_input_matches_bare_segment() {
    let router = sample_router();
    assert_eq!(
        router.identify_command(Some("bar/foo")),
        CommandKey::prefix("bar")
    );
    assert_eq!(router.get_event(Some("bar/foo")).name(), "f");
}

#[test]
fn test_unmatched_undelimited_falls_back_to_default() {
    let router = sample_router();
    assert_eq!(router.identify_command(Some("fudge")), CommandKey::Default);
    assert_eq!(router.identify_command(Some("")), CommandKey::Default);
}

#[test]
fn test_root_path_matches_root_entry() {
    let router = sample_router();
    assert_eq!(router.identify_command(Some("/")), CommandKey::prefix("/"));
}

#[test]
fn test_prefix_requires_segment_boundary() {
    let router = sample_router();
    assert_eq!(
        router.identify_command(Some("/foobar")),
        CommandKey::prefix("/")
    );
    assert_eq!(
        router.identify_command(Some("/foo/barbaz")),
        CommandKey::prefix("/foo")
    );
}

#[test]
fn test_without_root_entry_delimited_miss_is_default() {
    let registry = Registry::builder()
        .default_handler(tagged("a"))
        .route("/foo", tagged("c"))
        .build()
        .unwrap();
    let router = CommandRouter::new(registry);
    assert_eq!(router.identify_command(Some("/baz")), CommandKey::Default);
}

#[test]
fn test_resolution_is_cached() {
    let router = sample_router();
    assert_eq!(router.cache_len(), 0);
    let first = router.identify_command(Some("/foo/bar/baz"));
    assert_eq!(router.cache_len(), 1);
    let second = router.identify_command(Some("/foo/bar/baz"));
    assert_eq!(first, second);
    assert_eq!(router.cache_len(), 1);
    // None is never cached.
    let _ = router.identify_command(None);
    assert_eq!(router.cache_len(), 1);
}

#[test]
fn test_registry_requires_default() {
    let err = Registry::builder()
        .route("/foo", tagged("c"))
        .build()
        .unwrap_err();
    assert_eq!(err, RegistryError::MissingDefault);
}

#[test]
fn test_empty_key_registers_default() {
    let registry = Registry::builder().route("", tagged("z")).build().unwrap();
    assert_eq!(registry.default_handler().name(), "z");
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let err = Registry::builder()
        .default_handler(tagged("a"))
        .route("/foo", tagged("c"))
        .route("/foo", tagged("d"))
        .build()
        .unwrap_err();
    assert_eq!(err, RegistryError::Duplicate("/foo".into()));
}

#[test]
fn test_route_attaches_command() {
    let router = sample_router();
    let req = crate::message::RequestBuilder::new(crate::channel::Protocol::Get)
        .command_line("/foo/x")
        .build();
    let (routed, handler) = router.route(req);
    assert_eq!(routed.command(), Some(&CommandKey::prefix("/foo")));
    assert_eq!(handler.name(), "c");
}
