use std::{
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{Duration, Utc};
use shared::domain::ApplicationStatus;
use storage::{JobUpsert, Storage};

#[tokio::test]
async fn rows_and_fetch_history_survive_reopening_the_database() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("jobtracker_storage_acceptance_{suffix}"));
    let database_url = format!(
        "sqlite://{}",
        temp_root.join("db").join("tracker.db").display()
    );

    let fetched_at = Utc::now() - Duration::hours(1);
    let user_id = {
        let storage = Storage::new(&database_url).await.expect("open");
        let user_id = storage
            .upsert_user_by_email("a@b.com", "sheet-1")
            .await
            .expect("user");
        for (title, company, row) in [("Engineer", "Acme", 2), ("Analyst", "Globex", 3)] {
            storage
                .get_or_create_job(&JobUpsert {
                    user_id,
                    job_title: title,
                    company,
                    status: ApplicationStatus::Applied,
                    sender_email: None,
                    row_number: row,
                })
                .await
                .expect("job");
        }
        storage
            .insert_fetch_log(user_id, fetched_at)
            .await
            .expect("fetch log");
        user_id
    };

    let storage = Storage::new(&database_url).await.expect("reopen");
    let next_row = storage.count_jobs(user_id).await.expect("count") + 2;
    assert_eq!(next_row, 4);

    let (job, created) = storage
        .get_or_create_job(&JobUpsert {
            user_id,
            job_title: "Engineer",
            company: "Acme",
            status: ApplicationStatus::Offer,
            sender_email: Some("hr@acme.test"),
            row_number: next_row,
        })
        .await
        .expect("existing job");
    assert!(!created);
    assert_eq!(job.row_number, 2);
    assert_eq!(job.status, ApplicationStatus::Offer);

    let latest = storage
        .latest_fetch_date(user_id)
        .await
        .expect("latest")
        .expect("logged");
    assert_eq!(latest.timestamp(), fetched_at.timestamp());

    drop(storage);
    fs::remove_dir_all(temp_root).expect("cleanup");
}
