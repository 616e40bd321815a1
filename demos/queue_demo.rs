//! 候诊队列引擎演示程序
//!
//! 以放射科为例展示优先级插队、排名重算、取消补位和护士站推进

use carequeue_core::Department;
use carequeue_engine::{QueueEngine, QueueEventType, SubscriptionTopic};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let engine = QueueEngine::default();
    println!("🚀 候诊队列引擎演示\n");

    // 1. 注册科室
    engine
        .register_department(Department::new("radiology", "Radiology", 40).with_load(40))
        .await?;
    engine
        .register_department(
            Department::new("emergency", "Emergency", 30)
                .with_load(75)
                .with_fast_track_ceiling(5),
        )
        .await?;
    println!("✅ 科室注册完成");

    // 2. 登记患者
    for (id, name) in [("X", "Xavier"), ("Y", "Yvonne"), ("Z", "Zhang")] {
        engine.register_patient(id, name).await?;
    }
    println!("✅ 登记了 3 位患者");

    let mut radiology_events = engine.subscribe(SubscriptionTopic::Department("radiology".into()));

    // 3. 依次预约
    for (patient, priority) in [("X", "low"), ("Y", "medium"), ("Z", "emergency")] {
        let entry = engine.book_appointment(patient, "radiology", priority).await?;
        println!(
            "📋 {} 预约放射科 (优先级: {}) → 第 {} 位, 预计 {} 分钟",
            patient, priority, entry.position, entry.estimated_wait_minutes
        );
    }
    print_queue(&engine, "radiology").await?;

    // 4. 取消急诊患者，其余患者补位
    engine.cancel_appointment("Z").await?;
    println!("\n❌ Z 取消预约");
    print_queue(&engine, "radiology").await?;

    // 5. 护士站推进
    let patient = engine.staff_advance_patient("Y").await?;
    println!("\n🩺 Y 开始就诊: {}", patient.status);
    for row in engine.in_progress("radiology").await? {
        println!("   - {} 自 {} 起就诊", row.name, row.started_at.format("%H:%M:%S"));
    }
    let patient = engine.staff_advance_patient("Y").await?;
    println!("✅ Y 就诊完成: {}", patient.status);

    // 6. 急诊快速通道
    let entry = engine.admit_patient("Walk-in", "emergency", "high").await?;
    println!(
        "\n🚑 急诊登记 {} → 预计 {} 分钟（快速通道上限 5 分钟）",
        entry.patient_id, entry.estimated_wait_minutes
    );

    // 7. 事件流
    println!("\n🔔 放射科事件:");
    while let Some(event) = radiology_events.try_recv() {
        let detail = match event.event_type {
            QueueEventType::StatusChanged => format!("状态 {}", event.status),
            _ => format!(
                "第 {} 位, 预计 {} 分钟",
                event.position.unwrap_or_default(),
                event.estimated_wait_minutes.unwrap_or_default()
            ),
        };
        println!("   {} {}: {}", event.event_type.as_str(), event.patient_id, detail);
    }

    // 8. 统计
    let stats = engine.stats().await?;
    println!("\n📊 队列统计:");
    println!("   患者总数: {}", stats.patients.total);
    println!("   候诊中: {}", stats.patients.waiting);
    println!("   就诊中: {}", stats.patients.in_progress);
    println!("   已完成: {}", stats.patients.completed);
    println!("   已取消: {}", stats.patients.cancelled);
    println!("   科室平均等待: {} 分钟", stats.average_department_wait_minutes);

    tracing::info!("Queue demo finished");
    println!("\n🎉 演示完成!");
    Ok(())
}

async fn print_queue(engine: &QueueEngine, department_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n📊 {} 候诊队列:", department_id);
    for row in engine.get_department_snapshot(department_id).await? {
        println!(
            "   {}. {} ({}) 预计 {} 分钟",
            row.position, row.name, row.priority, row.estimated_wait_minutes
        );
    }
    Ok(())
}
