//! In-memory user list, private to one worker process.

use super::types::{User, UserInput};

/// Insertion-ordered user records.
#[derive(Debug)]
pub struct UserStore {
    users: Vec<User>,
    next_id: u64,
}

impl UserStore {
    /// An empty store whose first id is `1`.
    pub fn empty() -> Self {
        Self {
            users: Vec::new(),
            next_id: 1,
        }
    }

    /// The two records every worker starts with.
    pub fn seeded() -> Self {
        let mut store = Self::empty();
        store.create(UserInput {
            username: "Alex".into(),
            age: 25.into(),
            hobbies: "Reading,Acting".into(),
        });
        store.create(UserInput {
            username: "Henry".into(),
            age: 30.into(),
            hobbies: "Writing,Gardening".into(),
        });
        store
    }

    pub fn list(&self) -> &[User] {
        &self.users
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Append a record. Ids come from a counter, so a deleted id is never reissued.
    pub fn create(&mut self, input: UserInput) -> User {
        let user = User {
            id: self.next_id.to_string(),
            username: input.username,
            age: input.age,
            hobbies: input.hobbies,
        };
        self.next_id += 1;
        self.users.push(user.clone());
        user
    }

    /// Replace every field but the id. `None` if no such user.
    pub fn update(&mut self, id: &str, input: UserInput) -> Option<User> {
        let user = self.users.iter_mut().find(|u| u.id == id)?;
        user.username = input.username;
        user.age = input.age;
        user.hobbies = input.hobbies;
        Some(user.clone())
    }

    /// Remove a record, keeping the order of the rest.
    pub fn delete(&mut self, id: &str) -> Option<User> {
        let index = self.users.iter().position(|u| u.id == id)?;
        Some(self.users.remove(index))
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::seeded()
    }
}
