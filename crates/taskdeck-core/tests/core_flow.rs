use std::fs;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use pretty_assertions::assert_eq;
use taskdeck_core::calendar::{DayIndicator, build_grid};
use taskdeck_core::datastore::FileStore;
use taskdeck_core::filter::{FilterCriteria, filter_tasks};
use taskdeck_core::repo::{ProjectRepository, TaskRepository};
use taskdeck_core::service::Tracker;
use taskdeck_core::sort::{SortOrder, sort_tasks};
use taskdeck_core::stats::{TaskStats, aggregate};
use taskdeck_core::task::{Priority, Project, TaskDraft};
use tempfile::tempdir;

fn now() -> DateTime<Tz> {
    chrono_tz::America::New_York
        .with_ymd_and_hms(2024, 3, 10, 10, 0, 0)
        .single()
        .expect("valid local time")
}

#[test]
fn file_store_round_trip_and_engine_views() {
    let temp = tempdir().expect("tempdir");
    let utc_now = now().with_timezone(&Utc);

    {
        let mut store = FileStore::open(temp.path()).expect("open datastore");
        store
            .create_project(Project::new("work".to_string(), "Work".to_string(), utc_now))
            .expect("create project");

        for (title, due, priority) in [
            ("Ship release", Some((2024, 3, 9, 15)), Priority::High),
            ("Standup notes", Some((2024, 3, 11, 2)), Priority::Medium),
            ("Plan offsite", Some((2024, 3, 22, 16)), Priority::Low),
            ("Inbox zero", None, Priority::Medium),
        ] {
            store
                .create_task(
                    TaskDraft {
                        title: title.to_string(),
                        project_id: Some("work".to_string()),
                        due_date: due.map(|(y, m, d, h)| {
                            Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
                        }),
                        priority,
                    },
                    utc_now,
                )
                .expect("create task");
        }
    }

    let store = FileStore::open(temp.path()).expect("reopen datastore");
    let tasks = store.get_all_tasks().expect("load tasks");
    assert_eq!(tasks.len(), 4);
    assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

    // 02:00 UTC on the 11th is still the evening of the 10th in New York.
    let today = filter_tasks(
        &tasks,
        &FilterCriteria {
            today_only: true,
            ..Default::default()
        },
        &now(),
    );
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].title, "Standup notes");

    let ordered: Vec<String> = sort_tasks(tasks.clone(), SortOrder::Priority)
        .into_iter()
        .map(|t| t.title)
        .collect();
    assert_eq!(
        ordered,
        vec!["Ship release", "Standup notes", "Inbox zero", "Plan offsite"]
    );

    assert_eq!(
        aggregate(&tasks, &now()),
        TaskStats {
            total: 4,
            completed: 0,
            pending: 4,
            overdue: 1,
            today: 1,
            completion_rate: 0,
        }
    );

    let grid = build_grid(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &tasks, &now());
    let indicator = |d: u32| {
        grid.day(NaiveDate::from_ymd_opt(2024, 3, d).unwrap())
            .map(|day| day.indicator)
    };
    assert_eq!(indicator(9), Some(DayIndicator::Overdue));
    assert_eq!(indicator(10), Some(DayIndicator::DueToday));
    assert_eq!(indicator(11), Some(DayIndicator::Empty));
    assert_eq!(indicator(22), Some(DayIndicator::Upcoming));
}

#[test]
fn malformed_due_dates_on_disk_load_as_absent() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open datastore");
    fs::write(
        &store.tasks_path,
        concat!(
            r#"{"uuid":"6f1c1f7e-4d8f-4b7a-9a53-2c1b7f3a6d10","id":1,"title":"bad","completed":false,"dueDate":"next tuesday","priority":2,"createdAt":"2024-03-01T00:00:00Z"}"#,
            "\n",
            r#"{"uuid":"1d7c2b61-0f0e-4f55-8e47-9d1b1c8e2a33","id":2,"title":"compact","completed":false,"dueDate":"20240312T170000Z","priority":1,"createdAt":"2024-03-01T00:00:00Z"}"#,
            "\n",
            r#"{"uuid":"b3f0c8f2-3c1e-4a8e-9d6a-5e2f1a7b9c44","id":3,"title":"archived","completed":true,"completedAt":"garbage","priority":3,"createdAt":"2024-03-02T08:00:00Z"}"#,
            "\n",
            "\n",
        ),
    )
    .expect("write fixture");

    let tasks = store.get_all_tasks().expect("load tasks");
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.is_consistent()));
    assert_eq!(
        tasks[2].completed_at,
        Some(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap())
    );
    assert_eq!(tasks[0].due_date, None);
    assert_eq!(tasks[0].priority, Priority::Medium);
    assert_eq!(
        tasks[1].due_date,
        Some(Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 0).unwrap())
    );
}

#[test]
fn tracker_over_file_store_survives_corruption() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open datastore");
    let tasks_path = store.tasks_path.clone();
    let mut tracker = Tracker::new(store).with_retries(2, Duration::ZERO);

    let task = tracker
        .quick_add("Call client 12/28", None, Priority::High, &now())
        .expect("quick add");
    assert_eq!(task.title, "Call client");
    tracker
        .set_completed(&[task.id], true, &now())
        .expect("complete task");

    let reloaded = tracker.store().get_task(task.uuid).expect("get task");
    assert!(reloaded.completed);
    assert!(reloaded.is_consistent());

    fs::write(&tasks_path, "{not json}\n").expect("corrupt file");
    let view = tracker.view(&FilterCriteria::default(), SortOrder::Priority, &now());
    assert!(view.visible.is_empty());
    assert_eq!(view.stats, TaskStats::default());
}
