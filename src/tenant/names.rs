use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use rand::Rng;

/// Letters and digits.
pub const NAMESPACE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
/// Letters and digits without `0 O o 1 l I`.
pub const USERNAME_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnpqrstuvwxyz23456789";
/// Letters and digits.
pub const PASSWORD_ALPHABET: &[u8] = NAMESPACE_ALPHABET;

/// Source of generated namespaces, usernames and passwords.
pub trait NameGenerator: Send + Sync + fmt::Debug {
    /// Candidate topic namespace.
    fn namespace(&self, len: usize) -> String;
    /// Candidate broker username.
    fn username(&self, len: usize) -> String;
    /// Broker password.
    fn password(&self, len: usize) -> String;
}

/// Uniform picks from the thread-local CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomNames;

impl RandomNames {
    fn pick(alphabet: &[u8], len: usize) -> String {
        let mut rng = rand::rng();
        (0..len).map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())])).collect()
    }
}

impl NameGenerator for RandomNames {
    fn namespace(&self, len: usize) -> String {
        Self::pick(NAMESPACE_ALPHABET, len)
    }

    fn username(&self, len: usize) -> String {
        Self::pick(USERNAME_ALPHABET, len)
    }

    fn password(&self, len: usize) -> String {
        Self::pick(PASSWORD_ALPHABET, len)
    }
}

/// Scripted namespaces and usernames, then random ones once exhausted.
///
/// Passwords are always random. Used to force collisions in tests.
#[derive(Debug, Default)]
pub struct SequenceNames {
    namespaces: Mutex<VecDeque<String>>,
    usernames: Mutex<VecDeque<String>>,
}

impl SequenceNames {
    pub fn new<N, U>(namespaces: N, usernames: U) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        Self {
            namespaces: Mutex::new(namespaces.into_iter().map(Into::into).collect()),
            usernames: Mutex::new(usernames.into_iter().map(Into::into).collect()),
        }
    }

    fn next(queue: &Mutex<VecDeque<String>>) -> Option<String> {
        queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front()
    }
}

impl NameGenerator for SequenceNames {
    fn namespace(&self, len: usize) -> String {
        Self::next(&self.namespaces).unwrap_or_else(|| RandomNames.namespace(len))
    }

    fn username(&self, len: usize) -> String {
        Self::next(&self.usernames).unwrap_or_else(|| RandomNames.username(len))
    }

    fn password(&self, len: usize) -> String {
        RandomNames.password(len)
    }
}
