//! Query composition: [`Statement`], a deferred plan over one transaction.
//!
//! Engine operations are assembled from small fragments (load the visible
//! version, retire it, insert a new one...). Building a statement touches no
//! database; only [`Statement::execute`] does, and it runs the whole plan in a
//! single `IMMEDIATE` transaction that commits only if every fragment
//! succeeded. A fragment is any function `Statement<T> -> Statement<U>`, so
//! several engine operations can be combined into one atomic round trip.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::Result;

type Plan<T> = Box<dyn FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static>;

/// A composable unit of work producing a `T` inside one transaction.
#[must_use = "a statement does nothing until it is executed"]
pub struct Statement<T> {
  plan: Plan<T>,
}

impl<T: Send + 'static> Statement<T> {
  /// A statement that touches nothing and yields `value`.
  pub fn value(value: T) -> Self {
    Self { plan: Box::new(move |_| Ok(value)) }
  }

  /// A raw step against the transaction.
  pub fn step<F>(f: F) -> Self
  where
    F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
  {
    Self { plan: Box::new(f) }
  }

  /// Continue with a statement chosen from this one's output. Returning
  /// different statements from `f` gives mutually exclusive arms that are
  /// decided and applied within the same transaction.
  pub fn and_then<U, F>(self, f: F) -> Statement<U>
  where
    U: Send + 'static,
    F: FnOnce(T) -> Statement<U> + Send + 'static,
  {
    let first = self.plan;
    Statement {
      plan: Box::new(move |tx| {
        let value = first(tx)?;
        (f(value).plan)(tx)
      }),
    }
  }

  pub fn map<U, F>(self, f: F) -> Statement<U>
  where
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
  {
    let first = self.plan;
    Statement { plan: Box::new(move |tx| first(tx).map(f)) }
  }

  /// Run `next` after this statement, discarding this one's output.
  pub fn then<U: Send + 'static>(self, next: Statement<U>) -> Statement<U> {
    self.and_then(move |_| next)
  }

  /// Run both statements in order and yield both outputs.
  pub fn join<U: Send + 'static>(self, other: Statement<U>) -> Statement<(T, U)> {
    self.and_then(move |left| other.map(move |right| (left, right)))
  }

  /// Apply a fragment to this statement.
  pub fn apply<U, F>(self, fragment: F) -> Statement<U>
  where
    F: FnOnce(Self) -> Statement<U>,
  {
    fragment(self)
  }

  /// Run every statement in order, collecting their outputs.
  pub fn all<I>(statements: I) -> Statement<Vec<T>>
  where
    I: IntoIterator<Item = Statement<T>>,
  {
    let plans: Vec<Plan<T>> = statements.into_iter().map(|s| s.plan).collect();
    Statement {
      plan: Box::new(move |tx| plans.into_iter().map(|plan| plan(tx)).collect()),
    }
  }

  /// Run the plan in its own `IMMEDIATE` transaction. Any failing fragment
  /// rolls the whole statement back.
  pub fn execute(self, conn: &mut Connection) -> Result<T> {
    self.execute_with(conn, TransactionBehavior::Immediate)
  }

  /// Run the plan in its own transaction with the given locking behaviour.
  /// Read-only plans use `Deferred` so they never take the write lock.
  pub fn execute_with(
    self,
    conn: &mut Connection,
    behavior: TransactionBehavior,
  ) -> Result<T> {
    let tx = conn.transaction_with_behavior(behavior)?;
    let value = (self.plan)(&tx)?;
    tx.commit()?;
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use rusqlite::{Connection, params};

  use super::*;
  use crate::Error;

  fn conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch("CREATE TABLE log (entry TEXT NOT NULL);")
      .unwrap();
    conn
  }

  fn append(entry: &'static str) -> Statement<usize> {
    Statement::step(move |tx| {
      Ok(tx.execute("INSERT INTO log (entry) VALUES (?1)", params![entry])?)
    })
  }

  fn entries(conn: &Connection) -> Vec<String> {
    let mut stmt = conn.prepare("SELECT entry FROM log ORDER BY rowid").unwrap();
    stmt
      .query_map([], |row| row.get(0))
      .unwrap()
      .collect::<rusqlite::Result<_>>()
      .unwrap()
  }

  #[test]
  fn building_a_statement_touches_nothing() {
    let mut conn = conn();
    let statement = append("a").join(append("b"));
    assert!(entries(&conn).is_empty());

    assert_eq!(statement.execute(&mut conn).unwrap(), (1, 1));
    assert_eq!(entries(&conn), vec!["a", "b"]);
  }

  #[test]
  fn and_then_picks_the_next_arm_from_the_output() {
    let mut conn = conn();
    let statement = Statement::value(true).and_then(|flag| {
      if flag { append("yes") } else { append("no") }
    });
    statement.execute(&mut conn).unwrap();
    assert_eq!(entries(&conn), vec!["yes"]);
  }

  #[test]
  fn fragments_apply_to_statements() {
    let mut conn = conn();
    let twice = |s: Statement<usize>| s.then(append("again")).map(|n| n * 2);
    let written = append("once").apply(twice).execute(&mut conn).unwrap();
    assert_eq!(written, 2);
    assert_eq!(entries(&conn), vec!["once", "again"]);
  }

  #[test]
  fn all_collects_in_order() {
    let mut conn = conn();
    let counts = Statement::all(["x", "y", "z"].map(append))
      .execute(&mut conn)
      .unwrap();
    assert_eq!(counts, vec![1, 1, 1]);
    assert_eq!(entries(&conn), vec!["x", "y", "z"]);
  }

  #[test]
  fn a_failing_step_rolls_back_earlier_steps() {
    let mut conn = conn();
    let result = append("kept?")
      .then(Statement::<()>::step(|_| Err(Error::Decode("boom".into()))))
      .execute(&mut conn);
    assert!(matches!(result, Err(Error::Decode(_))));
    assert!(entries(&conn).is_empty());
  }
}
