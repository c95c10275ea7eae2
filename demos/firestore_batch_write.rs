use firestore_rest::{
    DatabaseId, Firestore, FirestoreSettings, FirestoreValue, InMemoryDatastore, MapValue,
};

/// Uses the configured project when `FIRESTORE_PROJECT_ID` is set, otherwise
/// an in-process datastore.
fn open_firestore() -> Result<Firestore, Box<dyn std::error::Error>> {
    let settings = FirestoreSettings::from_env();
    if settings.project_id.is_some() {
        return Ok(Firestore::connect(&settings)?);
    }
    eprintln!("FIRESTORE_PROJECT_ID not set; using the in-memory datastore");
    Ok(Firestore::with_datastore(
        DatabaseId::default("demo-project"),
        InMemoryDatastore::new(),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let firestore = open_firestore()?;
    let ada = firestore.document("users", "ada")?;
    let alan = firestore.document("users", "alan")?;

    let mut batch = firestore.batch();
    batch
        .create(
            &ada,
            MapValue::default()
                .with("first", "Ada")
                .with("last", "Lovelace")
                .with("born", 1815),
        )?
        .create(
            &alan,
            MapValue::default()
                .with("first", "Alan")
                .with("last", "Turing")
                .with("born", 1912),
        )?;
    let response = batch.commit().await?;
    println!(
        "committed {} writes at {:?}",
        response.write_results.len(),
        response.commit_time
    );

    let mut rename = firestore.batch();
    rename.update(&alan, MapValue::default().with("middle", "Mathison"), true)?;
    rename.commit().await?;

    let snapshot = alan.get().await?;
    let middle = snapshot.get("middle").and_then(FirestoreValue::as_str);
    println!("{} has middle name {:?}", snapshot.id(), middle);

    let mut query = firestore
        .collection("users")?
        .query()
        .order_by("born", "asc")?
        .limit(10);
    for user in query.get().await? {
        println!("{} => {:?}", user.id(), user.data());
    }
    Ok(())
}
