use firestore_rest::{
    DatabaseId, Firestore, FirestoreError, FirestoreSettings, FirestoreValue, InMemoryDatastore,
    MapValue,
};

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
    let alice = firestore.document("accounts", "alice")?;
    let bob = firestore.document("accounts", "bob")?;

    alice.set(MapValue::default().with("balance", 100), true).await?;
    bob.set(MapValue::default().with("balance", 20), true).await?;

    let amount = 30;
    let (from, to) = (alice.clone(), bob.clone());
    let remaining = firestore
        .run_transaction(move |transaction| {
            Box::pin(async move {
                let from_balance = transaction
                    .get(&from)
                    .await?
                    .get("balance")
                    .and_then(FirestoreValue::as_integer)
                    .unwrap_or(0);
                if from_balance < amount {
                    return Err(FirestoreError::InvalidArgument("insufficient funds".into()));
                }
                let to_balance = transaction
                    .get(&to)
                    .await?
                    .get("balance")
                    .and_then(FirestoreValue::as_integer)
                    .unwrap_or(0);
                transaction
                    .update(&from, MapValue::default().with("balance", from_balance - amount), true)?
                    .update(&to, MapValue::default().with("balance", to_balance + amount), true)?;
                Ok(from_balance - amount)
            })
        })
        .await?;
    println!("alice has {remaining} left");

    let mut manual = firestore.begin_transaction().await?;
    manual.delete(&bob)?;
    manual.rollback().await?;
    println!("bob still exists: {}", bob.exists().await?);
    Ok(())
}
