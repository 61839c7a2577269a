use rollguard_state::StateStore;

/// Print the stored record for `id` as pretty JSON.
pub fn status(store: &StateStore, id: &str) -> anyhow::Result<()> {
    println!("{}", render(store, id)?);
    Ok(())
}

fn render(store: &StateStore, id: &str) -> anyhow::Result<String> {
    match store.get(id)? {
        Some(record) => Ok(serde_json::to_string_pretty(&record)?),
        None => anyhow::bail!("deployment '{id}' not found"),
    }
}

/// Drop records past their retention window.
pub fn purge(store: &StateStore) -> anyhow::Result<()> {
    let removed = store.purge_expired()?;
    println!("✓ Purged {removed} expired record(s)");
    Ok(())
}
