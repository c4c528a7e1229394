//! Routers: key sequence patterns compiled into a prefix tree.

use crate::key::Key;
use crate::pattern::parse_pattern;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Default time an ambiguous prefix waits for a longer match.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// A matched key sequence, handed to the handler that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// The matched keys, without any count prefix digits.
    pub keys: Vec<Key>,
    /// Count prefix. Defaults to 1 when none was typed.
    pub count: usize,
}

/// An application message produced by a message handler.
///
/// The router never looks inside it; it only forwards it to the sink.
pub type Message = Box<dyn Any + Send>;

/// Destination for messages produced by [`Router::handle_msg`] handlers.
pub trait MessageSink: Send + Sync {
    /// Deliver one message.
    fn send(&self, msg: Message);
}

impl MessageSink for mpsc::Sender<Message> {
    fn send(&self, msg: Message) {
        // A closed receiver means the application is shutting down.
        let _ = mpsc::Sender::send(self, msg);
    }
}

/// Adapts a closure into a [`MessageSink`].
pub struct SinkFn<F>(pub F);

impl<F> MessageSink for SinkFn<F>
where
    F: Fn(Message) + Send + Sync,
{
    fn send(&self, msg: Message) {
        (self.0)(msg)
    }
}

/// A callback invoked when its pattern matches.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&Match) + Send + Sync>);

impl Handler {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Match) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self, m: &Match) {
        (self.0)(m)
    }

    /// Whether two handles refer to the same callback.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

type Hook = Arc<dyn Fn(&Match) + Send + Sync>;

/// Result of walking the trie with a buffered key sequence.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    /// Handler of the longest pattern found along the walked path.
    pub handler: Option<Handler>,
    /// Number of keys that pattern consumed.
    pub consumed: usize,
    /// Whether the whole buffer was walked and more input could still
    /// complete a longer pattern.
    pub has_longer: bool,
}

#[derive(Clone, Default)]
struct Node {
    children: HashMap<Key, Node>,
    handler: Option<Handler>,
}

/// A named binding as seen by introspection and rebinding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Semantic action name, e.g. `scroll_down`
    pub name: String,
    /// Current pattern (after rebinding)
    pub pattern: String,
    /// Pattern the binding was registered with
    pub default_pattern: String,
}

#[derive(Clone)]
struct NamedBinding {
    default_pattern: String,
    current_pattern: String,
    handler: Handler,
}

/// A set of key patterns and their handlers.
///
/// Register everything before handing the router to an
/// [`Input`](crate::Input); once pushed it is shared and read-only.
pub struct Router {
    root: Arc<Node>,
    timeout: Duration,
    name: String,
    /// Set once any pattern binds a key that arrives as an escape sequence.
    has_escape_sequences: bool,
    aliases: HashMap<String, String>,
    named: HashMap<String, NamedBinding>,
    binding_order: Vec<String>,
    sender: Option<Arc<dyn MessageSink>>,
    before: Vec<Hook>,
    after: Vec<Hook>,
}

impl Router {
    /// Create an empty router with the default timeout.
    pub fn new() -> Self {
        Self {
            root: Arc::new(Node::default()),
            timeout: DEFAULT_TIMEOUT,
            name: String::new(),
            has_escape_sequences: false,
            aliases: HashMap::new(),
            named: HashMap::new(),
            binding_order: Vec::new(),
            sender: None,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Set how long an ambiguous prefix waits before its handler fires.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a name for the router (useful for modes).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the sink that receives messages from message handlers.
    pub fn with_sender(mut self, sink: impl MessageSink + 'static) -> Self {
        self.sender = Some(Arc::new(sink));
        self
    }

    /// Disambiguation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Router name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any registered pattern uses a key that a terminal sends as
    /// an escape sequence (arrows, function keys, Alt chords).
    ///
    /// When false, a reader can treat a lone ESC byte as Escape immediately.
    pub fn has_escape_sequences(&self) -> bool {
        self.has_escape_sequences
    }

    /// Define an alias usable as `<Name>` in patterns.
    ///
    /// ```
    /// # use tui_keyrouter::Router;
    /// let mut router = Router::new();
    /// router.set_alias("Leader", ",");
    /// router.handle("<Leader>f", |_| {}); // registers ",f"
    /// ```
    pub fn set_alias(&mut self, name: &str, expansion: impl Into<String>) -> &mut Self {
        self.aliases.insert(name.to_lowercase(), expansion.into());
        self
    }

    /// Replace alias references in a pattern with their expansions.
    ///
    /// Exactly one pass: an expansion is never expanded again.
    pub fn expand_aliases(&self, pattern: &str) -> String {
        if self.aliases.is_empty() {
            return pattern.to_string();
        }

        let mut result = String::with_capacity(pattern.len());
        let mut rest = pattern;
        while let Some(start) = rest.find('<') {
            result.push_str(&rest[..start]);
            let token = &rest[start..];
            let Some(end) = token.find('>') else {
                result.push_str(token);
                return result;
            };
            match self.aliases.get(&token[1..end].to_lowercase()) {
                Some(expansion) => result.push_str(expansion),
                None => result.push_str(&token[..=end]),
            }
            rest = &token[end + 1..];
        }
        result.push_str(rest);
        result
    }

    /// Register a handler for a pattern.
    ///
    /// Registering the same key sequence again replaces its handler.
    /// An empty pattern is ignored.
    pub fn handle<F>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Match) + Send + Sync + 'static,
    {
        self.register(pattern, Handler::new(handler));
    }

    /// Register a handler whose return value is forwarded to the sink.
    pub fn handle_msg<F, M>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&Match) -> M + Send + Sync + 'static,
        M: Any + Send,
    {
        let handler = self.message_handler(handler);
        self.register(pattern, handler);
    }

    /// Register a handler under a semantic name, so it can be listed and
    /// rebound later.
    pub fn handle_named<F>(&mut self, name: &str, default_pattern: &str, handler: F)
    where
        F: Fn(&Match) + Send + Sync + 'static,
    {
        self.register_named(name, default_pattern, Handler::new(handler));
    }

    /// Named variant of [`handle_msg`](Self::handle_msg).
    pub fn handle_named_msg<F, M>(&mut self, name: &str, default_pattern: &str, handler: F)
    where
        F: Fn(&Match) -> M + Send + Sync + 'static,
        M: Any + Send,
    {
        let handler = self.message_handler(handler);
        self.register_named(name, default_pattern, handler);
    }

    fn message_handler<F, M>(&self, handler: F) -> Handler
    where
        F: Fn(&Match) -> M + Send + Sync + 'static,
        M: Any + Send,
    {
        let sink = self.sender.clone();
        if sink.is_none() {
            tracing::warn!(router = %self.name, "message handler registered without a sink");
        }
        Handler::new(move |m| {
            let msg = handler(m);
            if let Some(sink) = &sink {
                sink.send(Box::new(msg));
            }
        })
    }

    fn register_named(&mut self, name: &str, default_pattern: &str, handler: Handler) {
        let previous = self.named.insert(
            name.to_string(),
            NamedBinding {
                default_pattern: default_pattern.to_string(),
                current_pattern: default_pattern.to_string(),
                handler: handler.clone(),
            },
        );
        match previous {
            Some(old) => self.unregister(&old.current_pattern),
            None => self.binding_order.push(name.to_string()),
        }
        self.register(default_pattern, handler);
    }

    /// Insert a handler into the trie.
    pub fn register(&mut self, pattern: &str, handler: Handler) {
        let keys = parse_pattern(&self.expand_aliases(pattern));
        if keys.is_empty() {
            return;
        }

        if keys.iter().any(Key::requires_escape_sequence) {
            self.has_escape_sequences = true;
        }

        let mut node = Arc::make_mut(&mut self.root);
        for key in &keys {
            node = node.children.entry(*key).or_default();
        }
        node.handler = Some(handler);

        tracing::debug!(router = %self.name, pattern, keys = keys.len(), "registered pattern");
    }

    /// Remove the handler registered for a pattern.
    ///
    /// Nodes below it stay in place, so longer patterns keep working.
    pub fn unregister(&mut self, pattern: &str) {
        let keys = parse_pattern(&self.expand_aliases(pattern));
        if keys.is_empty() || !self.contains(&keys) {
            return;
        }

        let mut node = Arc::make_mut(&mut self.root);
        for key in &keys {
            match node.children.get_mut(key) {
                Some(child) => node = child,
                None => return,
            }
        }
        node.handler = None;

        tracing::debug!(router = %self.name, pattern, "unregistered pattern");
    }

    fn contains(&self, keys: &[Key]) -> bool {
        let mut node = self.root.as_ref();
        for key in keys {
            match node.children.get(key) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.handler.is_some()
    }

    /// Walk the trie with a buffered key sequence.
    ///
    /// The returned handler is the longest complete pattern found on the
    /// walked path, even when a later key leaves the trie.
    pub fn lookup(&self, keys: &[Key]) -> Lookup {
        let mut node = self.root.as_ref();
        let mut best = Lookup::default();

        for (i, key) in keys.iter().enumerate() {
            let Some(child) = node.children.get(key) else {
                return best;
            };
            node = child;
            if let Some(handler) = &node.handler {
                best.handler = Some(handler.clone());
                best.consumed = i + 1;
            }
        }

        best.has_longer = !node.children.is_empty();
        best
    }

    /// Change the pattern of a named binding.
    ///
    /// Returns false if no binding has that name.
    pub fn rebind(&mut self, name: &str, pattern: &str) -> bool {
        let Some(binding) = self.named.get_mut(name) else {
            return false;
        };
        let old = std::mem::replace(&mut binding.current_pattern, pattern.to_string());
        let handler = binding.handler.clone();

        self.unregister(&old);
        self.register(pattern, handler);
        tracing::debug!(router = %self.name, name, from = %old, to = pattern, "rebound");
        true
    }

    /// Restore a named binding to its default pattern.
    pub fn reset(&mut self, name: &str) -> bool {
        let Some(binding) = self.named.get(name) else {
            return false;
        };
        if binding.current_pattern == binding.default_pattern {
            return true;
        }
        let default = binding.default_pattern.clone();
        self.rebind(name, &default)
    }

    /// Restore every named binding to its default.
    pub fn reset_all(&mut self) {
        for name in self.binding_order.clone() {
            self.reset(&name);
        }
    }

    /// All named bindings in registration order.
    pub fn bindings(&self) -> Vec<Binding> {
        self.binding_order
            .iter()
            .filter_map(|name| {
                self.named.get(name).map(|b| Binding {
                    name: name.clone(),
                    pattern: b.current_pattern.clone(),
                    default_pattern: b.default_pattern.clone(),
                })
            })
            .collect()
    }

    /// Current patterns of the named bindings.
    pub fn bindings_map(&self) -> HashMap<String, String> {
        self.named
            .iter()
            .map(|(name, b)| (name.clone(), b.current_pattern.clone()))
            .collect()
    }

    /// Default patterns of the named bindings.
    pub fn default_bindings_map(&self) -> HashMap<String, String> {
        self.named
            .iter()
            .map(|(name, b)| (name.clone(), b.default_pattern.clone()))
            .collect()
    }

    /// Rebind every known name in the map. Unknown names are ignored.
    pub fn apply_bindings<K, V>(&mut self, bindings: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, pattern) in bindings {
            self.rebind(name.as_ref(), pattern.as_ref());
        }
    }

    /// Add a hook that runs right before any handler of this router fires.
    pub fn on_before(&mut self, hook: impl Fn(&Match) + Send + Sync + 'static) -> &mut Self {
        self.before.push(Arc::new(hook));
        self
    }

    /// Add a hook that runs right after any handler of this router fires.
    pub fn on_after(&mut self, hook: impl Fn(&Match) + Send + Sync + 'static) -> &mut Self {
        self.after.push(Arc::new(hook));
        self
    }

    /// Clone the router including its hooks.
    ///
    /// Plain [`Clone`] leaves hooks behind.
    pub fn copy_with_hooks(&self) -> Self {
        let mut copy = self.clone();
        copy.before = self.before.clone();
        copy.after = self.after.clone();
        copy
    }

    /// Run a handler wrapped in this router's hooks.
    pub(crate) fn invoke(&self, handler: &Handler, m: &Match) {
        for hook in &self.before {
            hook(m);
        }
        handler.call(m);
        for hook in &self.after {
            hook(m);
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Shares the compiled trie with the original. Hooks are not carried over.
impl Clone for Router {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
            timeout: self.timeout,
            name: self.name.clone(),
            has_escape_sequences: self.has_escape_sequences,
            aliases: self.aliases.clone(),
            named: self.named.clone(),
            binding_order: self.binding_order.clone(),
            sender: self.sender.clone(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("has_escape_sequences", &self.has_escape_sequences)
            .field("bindings", &self.binding_order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn keys(pattern: &str) -> Vec<Key> {
        parse_pattern(pattern)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&Match) + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move |_: &Match| {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_lookup_exact() {
        let mut router = Router::new();
        router.handle("j", |_| {});

        let found = router.lookup(&keys("j"));
        assert!(found.handler.is_some());
        assert_eq!(found.consumed, 1);
        assert!(!found.has_longer);

        let missing = router.lookup(&keys("x"));
        assert!(missing.handler.is_none());
        assert_eq!(missing.consumed, 0);
        assert!(!missing.has_longer);
    }

    #[test]
    fn test_lookup_ambiguous_prefix() {
        let mut router = Router::new();
        router.handle("g", |_| {});
        router.handle("gg", |_| {});

        let found = router.lookup(&keys("g"));
        assert!(found.handler.is_some());
        assert_eq!(found.consumed, 1);
        assert!(found.has_longer);

        let found = router.lookup(&keys("gg"));
        assert_eq!(found.consumed, 2);
        assert!(!found.has_longer);
    }

    #[test]
    fn test_lookup_keeps_longest_on_dead_end() {
        let mut router = Router::new();
        router.handle("d", |_| {});
        router.handle("dd", |_| {});

        let found = router.lookup(&keys("dx"));
        assert!(found.handler.is_some());
        assert_eq!(found.consumed, 1);
        assert!(!found.has_longer);
    }

    #[test]
    fn test_lookup_prefix_without_handler() {
        let mut router = Router::new();
        router.handle("<C-w>j", |_| {});

        let found = router.lookup(&keys("<C-w>"));
        assert!(found.handler.is_none());
        assert!(found.has_longer);
    }

    #[test]
    fn test_register_overwrites() {
        let (first, h1) = counter();
        let (second, h2) = counter();
        let mut router = Router::new();
        router.handle("j", h1);
        router.handle("j", h2);

        let found = router.lookup(&keys("j"));
        found.handler.unwrap().call(&Match { keys: keys("j"), count: 1 });
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_pattern_ignored() {
        let mut router = Router::new();
        router.handle("", |_| {});
        assert!(router.lookup(&[]).handler.is_none());
        assert!(!router.lookup(&[]).has_longer);
    }

    #[test]
    fn test_unregister_keeps_children() {
        let mut router = Router::new();
        router.handle("g", |_| {});
        router.handle("gg", |_| {});
        router.unregister("g");

        let found = router.lookup(&keys("g"));
        assert!(found.handler.is_none());
        assert!(found.has_longer);
        assert!(router.lookup(&keys("gg")).handler.is_some());

        // Unknown patterns are a no-op.
        router.unregister("zz");
    }

    #[test]
    fn test_has_escape_sequences() {
        let mut router = Router::new();
        router.handle("j", |_| {});
        router.handle("<C-w>", |_| {});
        router.handle("<Esc>", |_| {});
        assert!(!router.has_escape_sequences());

        router.handle("<Up>", |_| {});
        assert!(router.has_escape_sequences());

        let mut alt = Router::new();
        alt.handle("<A-x>", |_| {});
        assert!(alt.has_escape_sequences());
    }

    #[test]
    fn test_aliases() {
        let mut router = Router::new();
        router.set_alias("Leader", ",").set_alias("nav", "<C-w>");

        assert_eq!(router.expand_aliases("<leader>f"), ",f");
        assert_eq!(router.expand_aliases("<Nav>j"), "<C-w>j");
        assert_eq!(router.expand_aliases("<C-x><Leader>"), "<C-x>,");
        assert_eq!(router.expand_aliases("a<b"), "a<b");

        router.handle("<Leader>f", |_| {});
        assert!(router.lookup(&keys(",f")).handler.is_some());
    }

    #[test]
    fn test_alias_expands_once() {
        let mut router = Router::new();
        router.set_alias("a", "<b>").set_alias("b", "x");
        assert_eq!(router.expand_aliases("<a>"), "<b>");
    }

    #[test]
    fn test_named_bindings() {
        let mut router = Router::new();
        router.handle_named("down", "j", |_| {});
        router.handle_named("top", "gg", |_| {});

        let bindings = router.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].name, "down");
        assert_eq!(bindings[1].pattern, "gg");

        assert!(router.rebind("down", "n"));
        assert!(router.lookup(&keys("j")).handler.is_none());
        assert!(router.lookup(&keys("n")).handler.is_some());
        assert_eq!(router.bindings_map()["down"], "n");
        assert_eq!(router.default_bindings_map()["down"], "j");

        assert!(!router.rebind("missing", "x"));

        assert!(router.reset("down"));
        assert!(router.lookup(&keys("j")).handler.is_some());
        assert!(router.lookup(&keys("n")).handler.is_none());
        assert!(!router.reset("missing"));
    }

    #[test]
    fn test_apply_bindings_and_reset_all() {
        let mut router = Router::new();
        router.handle_named("down", "j", |_| {});
        router.handle_named("up", "k", |_| {});

        router.apply_bindings([("down", "<Down>"), ("up", "<Up>"), ("unknown", "z")]);
        assert!(router.lookup(&keys("<Down>")).handler.is_some());
        assert!(router.lookup(&keys("z")).handler.is_none());

        router.reset_all();
        for b in router.bindings() {
            assert_eq!(b.pattern, b.default_pattern);
        }
    }

    #[test]
    fn test_clone_shares_trie_without_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new().with_name("normal");
        let log = calls.clone();
        router.on_before(move |_| log.lock().unwrap().push("before"));
        let (hits, h) = counter();
        router.handle("j", h);

        let clone = router.clone();
        assert!(Arc::ptr_eq(&router.root, &clone.root));
        assert_eq!(clone.name(), "normal");

        let m = Match { keys: keys("j"), count: 1 };
        let handler = clone.lookup(&keys("j")).handler.unwrap();
        clone.invoke(&handler, &m);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(calls.lock().unwrap().is_empty());

        let copy = router.copy_with_hooks();
        copy.invoke(&handler, &m);
        assert_eq!(*calls.lock().unwrap(), vec!["before"]);
    }

    #[test]
    fn test_clone_copy_on_write() {
        let mut router = Router::new();
        router.handle("j", |_| {});
        let mut clone = router.clone();
        clone.handle("k", |_| {});

        assert!(clone.lookup(&keys("k")).handler.is_some());
        assert!(router.lookup(&keys("k")).handler.is_none());
    }

    #[test]
    fn test_hooks_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        let (b1, b2, a1, h) = (calls.clone(), calls.clone(), calls.clone(), calls.clone());
        router
            .on_before(move |_| b1.lock().unwrap().push("before-1"))
            .on_before(move |_| b2.lock().unwrap().push("before-2"))
            .on_after(move |_| a1.lock().unwrap().push("after"));
        router.handle("x", move |_| h.lock().unwrap().push("handler"));

        let handler = router.lookup(&keys("x")).handler.unwrap();
        router.invoke(&handler, &Match { keys: keys("x"), count: 1 });
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["before-1", "before-2", "handler", "after"]
        );
    }

    #[test]
    fn test_handle_msg_forwards_to_sink() {
        #[derive(Debug, PartialEq)]
        struct Move(i64);

        let (tx, rx) = mpsc::channel::<Message>();
        let mut router = Router::new().with_sender(tx);
        router.handle_msg("j", |m| Move(m.count as i64));
        router.handle_named_msg("up", "k", |m| Move(-(m.count as i64)));

        let m = Match { keys: vec![Key::char('j')], count: 3 };
        router.lookup(&keys("j")).handler.unwrap().call(&m);
        router.lookup(&keys("k")).handler.unwrap().call(&m);

        let first = rx.recv().unwrap().downcast::<Move>().unwrap();
        assert_eq!(*first, Move(3));
        let second = rx.recv().unwrap().downcast::<Move>().unwrap();
        assert_eq!(*second, Move(-3));
    }

    #[test]
    fn test_sink_fn() {
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        let mut router = Router::new().with_sender(SinkFn(move |_msg: Message| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        router.handle_msg("<Esc>", |_| "escape");
        router
            .lookup(&[Key::key(KeyCode::Esc)])
            .handler
            .unwrap()
            .call(&Match { keys: vec![], count: 1 });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
